// src/pipeline/sweep.rs

//! The daily sweep.
//!
//! Fetch every source listing, merge the unknown problems into the
//! repository, rebuild the known-problem snapshot and import whatever the
//! eligibility policy selects.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::seq::SliceRandom;

use crate::error::Result;
use crate::models::{Config, Problem, ProblemListing};
use crate::services::{DedupCache, EligibilityPolicy, ImportSummary, ProblemImporter, with_timeout};
use crate::sources::SourceRegistry;
use crate::storage::{ProblemQuery, ProblemRepository};
use crate::utils::log::{header, step, summary};

use super::trigger::SweepGuard;

/// Phase of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Fetching,
    Merging,
    Persisting,
    ReloadingCache,
    Importing,
}

impl SweepState {
    fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Fetching => "Fetching source listings",
            Self::Merging => "Merging new problems",
            Self::Persisting => "Persisting new problems",
            Self::ReloadingCache => "Reloading known problems",
            Self::Importing => "Importing eligible problems",
        }
    }
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State owned by one sweep and handed to each phase.
pub struct SweepContext {
    pub cache: DedupCache,
    pub policy: EligibilityPolicy,
    pub now: DateTime<Utc>,
}

impl SweepContext {
    pub fn new(policy: EligibilityPolicy, now: DateTime<Utc>) -> Self {
        Self {
            cache: DedupCache::new(),
            policy,
            now,
        }
    }

    /// Known problems the policy selects for import.
    pub fn eligible(&self, registry: &SourceRegistry) -> Vec<Problem> {
        self.cache
            .problems()
            .filter(|p| self.policy.is_eligible(p, self.now, registry.contains(&p.source)))
            .cloned()
            .collect()
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub listed: usize,
    pub inserted: usize,
    pub known: usize,
    pub eligible: usize,
    pub import: ImportSummary,
    /// Sources whose listing failed or timed out
    pub failed_sources: Vec<String>,
}

impl SweepReport {
    fn log(&self, title: &str) {
        let mut items = vec![
            ("Listed", self.listed.to_string()),
            ("Inserted", self.inserted.to_string()),
            ("Known", self.known.to_string()),
            ("Eligible", self.eligible.to_string()),
            ("Imported", self.import.imported.to_string()),
            ("Skipped", self.import.skipped.to_string()),
            ("Failed", self.import.failed.to_string()),
        ];
        if !self.failed_sources.is_empty() {
            items.push(("Failed sources", self.failed_sources.join(", ")));
        }
        summary(title, &items);
    }
}

/// Drives sweeps over the registered sources.
pub struct Orchestrator {
    config: Arc<Config>,
    registry: SourceRegistry,
    repository: Arc<dyn ProblemRepository>,
    importer: Arc<ProblemImporter>,
    guard: SweepGuard,
    state: Mutex<SweepState>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        registry: SourceRegistry,
        repository: Arc<dyn ProblemRepository>,
        importer: Arc<ProblemImporter>,
    ) -> Self {
        Self {
            config,
            registry,
            repository,
            importer,
            guard: SweepGuard::new(),
            state: Mutex::new(SweepState::Idle),
        }
    }

    pub fn state(&self) -> SweepState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn guard(&self) -> &SweepGuard {
        &self.guard
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn enter(&self, state: SweepState, step_num: usize, total: usize) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        step(step_num, total, state.label());
    }

    fn new_context(&self) -> SweepContext {
        SweepContext::new(EligibilityPolicy::from(&self.config.eligibility), Utc::now())
    }

    /// Run a full sweep.
    ///
    /// Returns `None` when another sweep is still running. Only repository
    /// failures abort the sweep; source and import failures are counted.
    pub async fn sweep(&self) -> Result<Option<SweepReport>> {
        let Some(_permit) = self.guard.try_acquire() else {
            log::warn!("A sweep is already running, skipping");
            return Ok(None);
        };
        header("Sweep starting");

        let result = self.run_sweep().await;
        self.enter_idle();
        let report = result?;
        report.log("Sweep complete");
        Ok(Some(report))
    }

    /// Import the eligible stored problems without fetching listings.
    pub async fn import_sweep(&self) -> Result<Option<SweepReport>> {
        let Some(_permit) = self.guard.try_acquire() else {
            log::warn!("A sweep is already running, skipping");
            return Ok(None);
        };
        header("Import sweep starting");

        let result = self.run_import_sweep().await;
        self.enter_idle();
        let report = result?;
        report.log("Import sweep complete");
        Ok(Some(report))
    }

    fn enter_idle(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SweepState::Idle;
    }

    async fn run_sweep(&self) -> Result<SweepReport> {
        const TOTAL: usize = 5;
        let mut ctx = self.new_context();
        let mut report = SweepReport::default();

        ctx.cache.rebuild(self.repository.find(&ProblemQuery::All).await?);

        self.enter(SweepState::Fetching, 1, TOTAL);
        let listings = self.fetch_all(&mut report).await;
        report.listed = listings.len();

        self.enter(SweepState::Merging, 2, TOTAL);
        let new_problems = ctx.cache.filter_new(listings);
        log::info!("{} new problems", new_problems.len());

        self.enter(SweepState::Persisting, 3, TOTAL);
        report.inserted = self.repository.insert_many(&new_problems).await?;

        self.enter(SweepState::ReloadingCache, 4, TOTAL);
        self.reload(&mut ctx).await?;
        report.known = ctx.cache.len();

        self.enter(SweepState::Importing, 5, TOTAL);
        self.import_eligible(&ctx, &mut report).await;
        Ok(report)
    }

    async fn run_import_sweep(&self) -> Result<SweepReport> {
        const TOTAL: usize = 2;
        let mut ctx = self.new_context();
        let mut report = SweepReport::default();

        self.enter(SweepState::ReloadingCache, 1, TOTAL);
        self.reload(&mut ctx).await?;
        report.known = ctx.cache.len();

        self.enter(SweepState::Importing, 2, TOTAL);
        self.import_eligible(&ctx, &mut report).await;
        Ok(report)
    }

    /// List every source concurrently; a failed or timed out source only
    /// loses its own listing.
    async fn fetch_all(&self, report: &mut SweepReport) -> Vec<ProblemListing> {
        let timeout = self.config.importer.listing_timeout();
        let results = join_all(self.registry.adapters().map(|adapter| async move {
            let context = format!("listing of {}", adapter.name());
            let result = with_timeout(&context, timeout, adapter.list_problems()).await;
            (adapter.name().to_string(), result)
        }))
        .await;

        let mut listings = Vec::new();
        for (source, result) in results {
            match result {
                Ok(mut fetched) => {
                    log::info!("Fetched {} problems from {}", fetched.len(), source);
                    listings.append(&mut fetched);
                }
                Err(e) => {
                    log::warn!("Failed to fetch problems from {}: {}", source, e);
                    report.failed_sources.push(source);
                }
            }
        }
        report.failed_sources.sort();
        listings
    }

    async fn reload(&self, ctx: &mut SweepContext) -> Result<()> {
        let problems = self.repository.find(&ProblemQuery::All).await?;
        ctx.cache.rebuild(problems);
        log::info!("{} known problems", ctx.cache.len());
        Ok(())
    }

    async fn import_eligible(&self, ctx: &SweepContext, report: &mut SweepReport) {
        let mut eligible = ctx.eligible(&self.registry);
        if self.config.importer.shuffle {
            eligible.shuffle(&mut rand::thread_rng());
        }
        report.eligible = eligible.len();
        log::info!("{} problems to import", eligible.len());

        report.import = self.importer.import_all(&self.registry, eligible).await;
    }
}
