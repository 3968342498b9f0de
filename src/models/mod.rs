// src/models/mod.rs

//! Domain models for the importer.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod problem;

// Re-export all public types
pub use config::{
    Config, EligibilityConfig, HttpConfig, ImporterConfig, ScheduleConfig, SegmenterConfig,
    SourceConfig, StorageBackend, StorageConfig, ToolsConfig,
};
pub use problem::{ImportOutcome, ImportedData, Problem, ProblemKey, ProblemListing};
