//! Pipeline entry points for importer operations.
//!
//! - `Orchestrator::sweep`: fetch listings, merge, persist, import
//! - `Orchestrator::import_sweep`: import the stored problems only
//! - `run_daemon`: run sweeps on the daily trigger

pub mod sweep;
pub mod trigger;

pub use sweep::{Orchestrator, SweepContext, SweepReport, SweepState};
pub use trigger::{DailyTrigger, SweepGuard, SweepPermit, run_daemon};
