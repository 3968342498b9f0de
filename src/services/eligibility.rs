// src/services/eligibility.rs

//! Import eligibility policy.
//!
//! Decides, without side effects, whether a known problem should be
//! (re)imported in the current sweep.

use chrono::{DateTime, Utc};

use crate::models::{EligibilityConfig, Problem};

/// Thresholds for retrying failures and refreshing imported content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityPolicy {
    pub max_import_tries: u32,
    pub stale_after_days: i64,
    pub refresh_after_days: i64,
}

impl EligibilityPolicy {
    /// Decide eligibility of `problem` at `now`.
    ///
    /// `registered` tells whether the problem's source still has an adapter;
    /// problems of deprecated sources are never imported.
    pub fn is_eligible(&self, problem: &Problem, now: DateTime<Utc>, registered: bool) -> bool {
        if !registered {
            return false;
        }
        if !problem.imported && problem.import_tries < self.max_import_tries {
            return true;
        }
        if days_since(problem.created_at, now) > self.stale_after_days {
            return false;
        }
        days_since(problem.updated_at, now) >= self.refresh_after_days
    }
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self::from(&EligibilityConfig::default())
    }
}

impl From<&EligibilityConfig> for EligibilityPolicy {
    fn from(config: &EligibilityConfig) -> Self {
        Self {
            max_import_tries: config.max_import_tries,
            stale_after_days: config.stale_after_days,
            refresh_after_days: config.refresh_after_days,
        }
    }
}

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Days elapsed since `at`, rounded half up; a missing timestamp counts from
/// the epoch.
fn days_since(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    let at = at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    ((now - at).num_milliseconds() + DAY_MS / 2).div_euclid(DAY_MS)
}
