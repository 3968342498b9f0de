// src/pipeline/trigger.rs

//! Daily scheduling of sweeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{FixedOffset, NaiveTime, Timelike};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::error::{AppError, Result};
use crate::models::ScheduleConfig;

use super::sweep::Orchestrator;

/// Fires once a day at a fixed wall-clock time of a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    at: NaiveTime,
    offset: FixedOffset,
}

impl DailyTrigger {
    pub fn new(hour: u32, minute: u32, offset: FixedOffset) -> Result<Self> {
        let at = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| AppError::config(format!("Invalid schedule time {hour:02}:{minute:02}")))?;
        Ok(Self { at, offset })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let offset = config.utc_offset().ok_or_else(|| {
            AppError::config(format!("Invalid UTC offset {}h", config.utc_offset_hours))
        })?;
        Self::new(config.hour, config.minute, offset)
    }

    /// Cron expression (with seconds) firing daily at the trigger time.
    pub fn cron(&self) -> String {
        format!("0 {} {} * * *", self.at.minute(), self.at.hour())
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Scheduler job starting a sweep on every fire.
    ///
    /// The scheduler runs each fire in its own task, so a sweep still
    /// running at the next fire makes that fire a logged skip.
    pub fn job(&self, orchestrator: Arc<Orchestrator>) -> Result<Job> {
        let job = Job::new_async_tz(self.cron().as_str(), self.offset, move |_id, _scheduler| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                if let Err(e) = orchestrator.sweep().await {
                    log::error!("Sweep failed: {}", e);
                }
            })
        })?;
        Ok(job)
    }
}

/// Marks a sweep as running; overlapping sweeps are refused.
#[derive(Debug, Clone, Default)]
pub struct SweepGuard {
    running: Arc<AtomicBool>,
}

impl SweepGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a sweep already holds it.
    pub fn try_acquire(&self) -> Option<SweepPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of a sweep; releases the guard on drop.
#[derive(Debug)]
pub struct SweepPermit {
    running: Arc<AtomicBool>,
}

impl Drop for SweepPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Run sweeps on the daily trigger until interrupted.
pub async fn run_daemon(orchestrator: Arc<Orchestrator>, trigger: DailyTrigger) -> Result<()> {
    let mut scheduler = JobScheduler::new().await?;
    scheduler.add(trigger.job(orchestrator)?).await?;
    scheduler.start().await?;
    log::info!(
        "Sweeps scheduled daily at {} (UTC{}), cron '{}'",
        trigger.at.format("%H:%M"),
        trigger.offset,
        trigger.cron()
    );

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down scheduler");
    scheduler.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recife() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_cron_expression() {
        let trigger = DailyTrigger::new(3, 0, recife()).unwrap();
        assert_eq!(trigger.cron(), "0 0 3 * * *");
        assert_eq!(trigger.offset(), recife());
        assert_eq!(DailyTrigger::new(23, 45, recife()).unwrap().cron(), "0 45 23 * * *");
    }

    #[test]
    fn test_scheduler_accepts_cron() {
        let trigger = DailyTrigger::new(3, 0, recife()).unwrap();
        let job = Job::new_async_tz(trigger.cron().as_str(), trigger.offset(), |_id, _scheduler| {
            Box::pin(async {})
        });
        assert!(job.is_ok());
    }

    #[test]
    fn test_trigger_from_default_schedule() {
        let trigger = DailyTrigger::from_config(&ScheduleConfig::default()).unwrap();
        assert_eq!(trigger, DailyTrigger::new(3, 0, recife()).unwrap());
    }

    #[test]
    fn test_invalid_time_rejected() {
        assert!(DailyTrigger::new(24, 0, recife()).is_err());
        assert!(DailyTrigger::from_config(&ScheduleConfig::default()).is_ok());
    }

    #[test]
    fn test_guard_refuses_overlap() {
        let guard = SweepGuard::new();
        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }
}
