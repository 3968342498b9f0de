// src/services/queue.rs

//! Bounded-concurrency task queues.
//!
//! Three tiers limit how much work runs at once:
//! - the global import queue (one slot per running import),
//! - one sub-queue per source, entered before the global queue so a slow or
//!   rate-limited judge can never occupy more than its own share,
//! - the asset queue used for image uploads.
//!
//! Timeouts and retries are decorators around a task future; they compose
//! with the queues but know nothing about them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::models::Config;

/// A named queue admitting at most `capacity` tasks at a time.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    /// Wait for a free slot, then run `task` to completion while holding it.
    pub async fn run<F: Future>(&self, task: F) -> F::Output {
        // The semaphore is never closed, so acquiring only waits.
        let _permit = self.semaphore.acquire().await.ok();
        task.await
    }
}

/// Bound a task by `after`; an elapsed task is dropped and reported as a
/// `Timeout` error.
pub async fn with_timeout<T, F>(context: &str, after: Duration, task: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, task).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout {
            context: context.to_string(),
            after,
        }),
    }
}

/// Re-runs a failed task while its error is retryable.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` (given the 1-based attempt number) until it succeeds, fails
    /// with a non-retryable error, or the attempts are used up. The last
    /// error is returned.
    pub async fn run<T, F, Fut>(&self, context: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    log::debug!(
                        "{} failed on attempt {}/{}: {}",
                        context,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::ZERO)
    }
}

/// Owns the import, per-source and asset queues.
#[derive(Debug)]
pub struct QueueManager {
    global: TaskQueue,
    assets: TaskQueue,
    default_per_source: usize,
    source_limits: HashMap<String, usize>,
    per_source: Mutex<HashMap<String, TaskQueue>>,
}

impl QueueManager {
    pub fn new(global: usize, per_source: usize, assets: usize) -> Self {
        Self {
            global: TaskQueue::new("import", global),
            assets: TaskQueue::new("assets", assets),
            default_per_source: per_source.max(1),
            source_limits: HashMap::new(),
            per_source: Mutex::new(HashMap::new()),
        }
    }

    /// Build queues from the importer settings and per-source overrides.
    pub fn from_config(config: &Config) -> Self {
        let importer = &config.importer;
        let mut manager = Self::new(
            importer.global_concurrency,
            importer.per_source_concurrency,
            importer.asset_concurrency,
        );
        for source in &config.sources {
            if let Some(limit) = source.max_import_workers {
                manager = manager.with_source_limit(&source.name, limit);
            }
        }
        manager
    }

    /// Override the sub-queue concurrency of one source.
    pub fn with_source_limit(mut self, source: impl Into<String>, limit: usize) -> Self {
        self.source_limits.insert(source.into(), limit.max(1));
        self
    }

    pub fn global(&self) -> &TaskQueue {
        &self.global
    }

    pub fn assets(&self) -> &TaskQueue {
        &self.assets
    }

    /// The sub-queue of `source`, created on first use.
    pub fn source_queue(&self, source: &str) -> TaskQueue {
        let mut queues = self.per_source.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(source.to_string())
            .or_insert_with(|| {
                let limit = self
                    .source_limits
                    .get(source)
                    .copied()
                    .unwrap_or(self.default_per_source);
                TaskQueue::new(format!("import:{source}"), limit)
            })
            .clone()
    }

    /// Admit `task` through the source's sub-queue, then the global queue.
    pub async fn run_import<F: Future>(&self, source: &str, task: F) -> F::Output {
        let source_queue = self.source_queue(source);
        source_queue.run(self.global.run(task)).await
    }
}
