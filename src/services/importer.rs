// src/services/importer.rs

//! Problem import tasks.
//!
//! One task per eligible problem: admitted through the source and global
//! queues, retried on transient errors, each attempt bounded by the import
//! timeout. The outcome is persisted once the task settles.
//!
//! Merged-PDF problems wait for their batch once, after the retried attempt.
//! The batch records a failure on its triggering problem itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{Config, ImportOutcome, Problem};
use crate::services::assets::AssetRewriter;
use crate::services::batch::PdfBatchImporter;
use crate::services::queue::{QueueManager, RetryPolicy, with_timeout};
use crate::services::segmenter::{DocumentTextExtractor, PdfSegmenter};
use crate::sources::{SourceAdapter, SourceRegistry};
use crate::storage::{AssetPublisher, ProblemRepository, PutOptions, keys};
use crate::utils::http::Fetcher;

/// Smallest body accepted as a PDF statement.
const MIN_PDF_BYTES: usize = 200;

/// How one import task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Imported,
    /// Nothing to do (handled elsewhere); no attempt is counted
    Skipped,
    Failed,
}

/// Counts of settled import tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportSummary {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Imported => self.imported += 1,
            TaskStatus::Skipped => self.skipped += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.imported + self.skipped + self.failed
    }
}

/// Result of one successful attempt.
enum Attempt {
    Published { problem: Problem, url: String },
    Skipped,
    /// Statement lives in a merged PDF still to be segmented
    MergedPdf(Problem),
}

impl Attempt {
    fn from_outcome(problem: Problem, outcome: ImportOutcome) -> Self {
        match outcome {
            ImportOutcome::Published { url } => Self::Published { problem, url },
            ImportOutcome::Skipped => Self::Skipped,
        }
    }
}

/// Runs import tasks and persists their outcome.
pub struct ProblemImporter {
    repository: Arc<dyn ProblemRepository>,
    publisher: Arc<dyn AssetPublisher>,
    fetcher: Arc<dyn Fetcher>,
    queues: QueueManager,
    assets: AssetRewriter,
    batches: PdfBatchImporter,
    retry: RetryPolicy,
    import_timeout: Duration,
    imported: AtomicUsize,
}

impl ProblemImporter {
    pub fn new(
        config: &Config,
        repository: Arc<dyn ProblemRepository>,
        publisher: Arc<dyn AssetPublisher>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn DocumentTextExtractor>,
    ) -> Result<Self> {
        let importer = &config.importer;
        let queues = QueueManager::from_config(config);
        let assets = AssetRewriter::new(
            fetcher.clone(),
            publisher.clone(),
            queues.assets().clone(),
            importer.asset_timeout(),
        )?;
        let segmenter = PdfSegmenter::new(extractor, fetcher.clone(), config.segmenter.clone())?;
        let batches = PdfBatchImporter::new(Arc::new(segmenter), repository.clone(), publisher.clone());

        Ok(Self {
            repository,
            publisher,
            fetcher,
            queues,
            assets,
            batches,
            retry: RetryPolicy::new(importer.retry_attempts, importer.retry_delay()),
            import_timeout: importer.import_timeout(),
            imported: AtomicUsize::new(0),
        })
    }

    pub fn queues(&self) -> &QueueManager {
        &self.queues
    }

    pub fn batches(&self) -> &PdfBatchImporter {
        &self.batches
    }

    /// Run one task per problem and wait for all of them to settle.
    ///
    /// Problems of unregistered sources are not scheduled.
    pub async fn import_all(&self, registry: &SourceRegistry, problems: Vec<Problem>) -> ImportSummary {
        let mut tasks: FuturesUnordered<_> = problems
            .into_iter()
            .filter_map(|problem| {
                let adapter = registry.get(&problem.source)?;
                Some(async move { self.import_problem(adapter.as_ref(), problem).await })
            })
            .collect();

        let mut summary = ImportSummary::default();
        while let Some(status) = tasks.next().await {
            summary.record(status);
        }
        summary
    }

    /// Run the import task of one problem and persist its outcome.
    pub async fn import_problem(&self, adapter: &dyn SourceAdapter, mut problem: Problem) -> TaskStatus {
        let context = format!("import of {}", problem.key());
        let result = self
            .queues
            .run_import(&problem.source, async {
                let attempt = self
                    .retry
                    .run(&context, |_| {
                        with_timeout(&context, self.import_timeout, self.attempt(adapter, &problem))
                    })
                    .await?;
                match attempt {
                    Attempt::MergedPdf(merged) => self.import_merged(merged).await,
                    attempt => Ok(attempt),
                }
            })
            .await;

        match result {
            Ok(Attempt::Published { problem: mut updated, url }) => {
                updated.mark_imported(url, Utc::now());
                if let Err(e) = self.repository.save(&updated).await {
                    log::error!("Failed to save imported {}: {}", updated.key(), e);
                    return TaskStatus::Failed;
                }
                let count = self.imported.fetch_add(1, Ordering::Relaxed) + 1;
                log::info!(
                    "{}: Imported {} from {}. {}",
                    count,
                    updated.id,
                    updated.source,
                    updated.url.as_deref().unwrap_or_default()
                );
                TaskStatus::Imported
            }
            Ok(Attempt::Skipped | Attempt::MergedPdf(_)) => TaskStatus::Skipped,
            Err(e) if e.is_already_handled() => {
                log::debug!("{}: {}", problem.key(), e);
                TaskStatus::Skipped
            }
            Err(e) if e.is_batch_outcome() => {
                log::warn!("Failed to import {}: {}", problem.key(), e);
                TaskStatus::Failed
            }
            Err(e) => {
                log::warn!("Failed to import {}: {}", problem.key(), e);
                problem.record_failure();
                if let Err(e) = self.repository.save(&problem).await {
                    log::error!("Failed to record failed import of {}: {}", problem.key(), e);
                }
                TaskStatus::Failed
            }
        }
    }

    async fn attempt(&self, adapter: &dyn SourceAdapter, problem: &Problem) -> Result<Attempt> {
        let data = adapter.import_one(problem).await?;
        let mut updated = problem.clone();
        updated.apply(data);

        if updated.is_pdf {
            return self.import_pdf(adapter, updated).await;
        }

        let html = updated
            .html
            .take()
            .filter(|html| !html.trim().is_empty())
            .ok_or_else(|| AppError::content(problem.key().to_string(), "Html is empty"))?;
        let page_url = adapter.problem_url(problem);
        let html = self.assets.rewrite(&updated, &html, page_url.as_deref()).await?;

        let key = keys::problem_html(&updated.source, &updated.id);
        let asset = self
            .publisher
            .put(&key, html.into_bytes(), &PutOptions::html())
            .await?;
        Ok(Attempt::Published {
            problem: updated,
            url: asset.url,
        })
    }

    /// PDF statements: the adapter's own batch handling, then a direct
    /// single-problem PDF, else the merged PDF is left to its batch.
    async fn import_pdf(&self, adapter: &dyn SourceAdapter, mut problem: Problem) -> Result<Attempt> {
        if let Some(outcome) = adapter.import_pdf_batch(&problem).await {
            return outcome.map(|outcome| Attempt::from_outcome(problem, outcome));
        }

        if let Some(pdf_url) = adapter.pdf_url(&problem) {
            let resource = self.fetcher.fetch(&pdf_url).await?;
            let is_pdf = resource
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("application/pdf"));
            if !is_pdf || resource.bytes.len() < MIN_PDF_BYTES {
                return Err(AppError::content(&pdf_url, "not a PDF statement"));
            }
            let key = keys::problem_pdf(&problem.source, &problem.id);
            let asset = self
                .publisher
                .put(&key, resource.bytes, &PutOptions::immutable(Some("application/pdf")))
                .await?;
            problem.original_url = Some(pdf_url);
            return Ok(Attempt::Published {
                problem,
                url: asset.url,
            });
        }

        Ok(Attempt::MergedPdf(problem))
    }

    /// Wait for the merged-PDF batch of `problem`, at most one import timeout.
    async fn import_merged(&self, problem: Problem) -> Result<Attempt> {
        match tokio::time::timeout(self.import_timeout, self.batches.import(&problem)).await {
            Ok(outcome) => Ok(Attempt::from_outcome(problem, outcome?)),
            Err(_) => Err(AppError::BatchPending {
                url: problem.original_url.unwrap_or_default(),
                after: self.import_timeout,
            }),
        }
    }
}
