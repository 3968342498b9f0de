// src/services/batch.rs

//! Merged-PDF batch import.
//!
//! All problems sharing one `original_url` are imported together: the PDF is
//! segmented once and every problem gets its own published PDF. Each URL is
//! attempted at most once per process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{ImportOutcome, Problem};
use crate::services::queue::TaskQueue;
use crate::services::segmenter::PdfSegmenter;
use crate::storage::{AssetPublisher, ProblemQuery, ProblemRepository, PutOptions, keys};

/// State of the one attempt made for a merged-PDF URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    InProgress,
    Succeeded,
    Failed,
}

/// Imports every problem of a merged PDF in one go.
#[derive(Clone)]
pub struct PdfBatchImporter {
    segmenter: Arc<PdfSegmenter>,
    repository: Arc<dyn ProblemRepository>,
    publisher: Arc<dyn AssetPublisher>,
    queue: TaskQueue,
    attempts: Arc<Mutex<HashMap<String, AttemptState>>>,
}

impl PdfBatchImporter {
    pub fn new(
        segmenter: Arc<PdfSegmenter>,
        repository: Arc<dyn ProblemRepository>,
        publisher: Arc<dyn AssetPublisher>,
    ) -> Self {
        Self {
            segmenter,
            repository,
            publisher,
            // Segmentation is heavy on external tools; one batch at a time.
            queue: TaskQueue::new("pdf-batch", 1),
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn attempt_state(&self, url: &str) -> Option<AttemptState> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
    }

    fn set_state(&self, url: &str, state: AttemptState) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), state);
    }

    /// Import the merged PDF `problem` belongs to.
    ///
    /// The first call for a URL runs the batch and saves every problem of it
    /// itself, so success is reported as `Skipped`. Any later call returns
    /// `AlreadyHandled`. A failed batch is returned as `AppError::Batch`.
    ///
    /// The batch runs detached: abandoning the returned future (e.g. on
    /// timeout) does not interrupt it. A failure is recorded on the
    /// triggering problem by the batch itself, waited for or not.
    pub async fn import(&self, problem: &Problem) -> Result<ImportOutcome> {
        let url = problem.original_url.clone().ok_or_else(|| {
            AppError::content(problem.key().to_string(), "merged PDF problem without originalUrl")
        })?;

        {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            if attempts.contains_key(&url) {
                return Err(AppError::AlreadyHandled(url));
            }
            attempts.insert(url.clone(), AttemptState::InProgress);
        }
        log::info!("Importing problem set of {} ({})", problem.key(), url);

        let this = self.clone();
        let task_url = url.clone();
        let trigger = problem.clone();
        let handle = tokio::spawn(async move {
            let result = this.queue.run(this.run_batch(&task_url)).await;
            let state = match &result {
                Ok(count) => {
                    log::info!("Loaded {} problems from {}", count, task_url);
                    AttemptState::Succeeded
                }
                Err(e) => {
                    log::warn!("Batch import of {} failed: {}", task_url, e);
                    this.record_trigger_failure(&task_url, trigger).await;
                    AttemptState::Failed
                }
            };
            this.set_state(&task_url, state);
            result
        });

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                self.record_trigger_failure(&url, problem.clone()).await;
                self.set_state(&url, AttemptState::Failed);
                Err(AppError::tool("batch task", e))
            }
        };

        match result {
            Ok(_) => Ok(ImportOutcome::Skipped),
            Err(e) => Err(AppError::Batch {
                url,
                source: Box::new(e),
            }),
        }
    }

    /// Count one failed import on the problem that triggered the batch of
    /// `url`, preferring its stored copy.
    async fn record_trigger_failure(&self, url: &str, trigger: Problem) {
        let stored = match self
            .repository
            .find(&ProblemQuery::ByOriginalUrl(url.to_string()))
            .await
        {
            Ok(problems) => problems.into_iter().find(|p| p.key() == trigger.key()),
            Err(e) => {
                log::warn!("Failed to reload {} after batch failure: {}", trigger.key(), e);
                None
            }
        };
        let mut problem = stored.unwrap_or(trigger);
        problem.record_failure();
        if let Err(e) = self.repository.save(&problem).await {
            log::error!("Failed to record failed import of {}: {}", problem.key(), e);
        }
    }

    async fn run_batch(&self, url: &str) -> Result<usize> {
        let mut problems = self
            .repository
            .find(&ProblemQuery::ByOriginalUrl(url.to_string()))
            .await?;
        problems.sort_by(|a, b| Problem::cmp_ids(&a.id, &b.id));

        let segmentation = self.segmenter.segment_url(url, problems.len()).await?;

        // Publish everything before touching the repository.
        let mut published = Vec::with_capacity(problems.len());
        for (problem, segment) in problems.iter().zip(&segmentation.problems) {
            let bytes = tokio::fs::read(&segment.path).await?;
            let key = keys::problem_pdf(&problem.source, &problem.id);
            let asset = self
                .publisher
                .put(&key, bytes, &PutOptions::immutable(Some("application/pdf")))
                .await?;
            published.push(asset.url);
        }

        let now = Utc::now();
        for ((problem, segment), url) in problems
            .iter_mut()
            .zip(&segmentation.problems)
            .zip(published)
        {
            problem.backfill_name(&segment.range.detected_name);
            problem.language = Some(segmentation.language.clone());
            problem.is_pdf = true;
            problem.mark_imported(url, now);
            self.repository.save(problem).await?;
            log::info!(
                "Imported in batch {}. {}",
                problem.key(),
                problem.url.as_deref().unwrap_or_default()
            );
        }
        Ok(problems.len())
    }
}
