//! Service layer for the importer.
//!
//! This module contains the business logic for:
//! - Import eligibility (`EligibilityPolicy`)
//! - Known-problem snapshots (`DedupCache`)
//! - Bounded task queues with timeout and retry (`QueueManager`)
//! - Import tasks and outcome persistence (`ProblemImporter`)
//! - Image rewriting (`AssetRewriter`)
//! - Merged-PDF segmentation (`PdfSegmenter`, `PdfBatchImporter`)

mod assets;
mod batch;
mod dedup;
mod eligibility;
mod importer;
pub mod queue;
pub mod segmenter;

pub use assets::{AssetRewriter, image_sources};
pub use batch::{AttemptState, PdfBatchImporter};
pub use dedup::DedupCache;
pub use eligibility::EligibilityPolicy;
pub use importer::{ImportSummary, ProblemImporter, TaskStatus};
pub use queue::{QueueManager, RetryPolicy, TaskQueue, with_timeout};
pub use segmenter::{DocumentTextExtractor, PdfSegmenter, PopplerTools, Segmentation};
