//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Queue sizes, timeouts and retry policy
    #[serde(default)]
    pub importer: ImporterConfig,

    /// Which known problems get (re)imported
    #[serde(default)]
    pub eligibility: EligibilityConfig,

    /// Daily sweep trigger
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Merged-PDF segmentation tuning and tool names
    #[serde(default)]
    pub segmenter: SegmenterConfig,

    /// Repository and blob store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Registered judge sources
    #[serde(default = "defaults::sources")]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let importer = &self.importer;
        if importer.global_concurrency == 0 {
            return Err(AppError::validation("importer.global_concurrency must be > 0"));
        }
        if importer.per_source_concurrency == 0 {
            return Err(AppError::validation(
                "importer.per_source_concurrency must be > 0",
            ));
        }
        if importer.asset_concurrency == 0 {
            return Err(AppError::validation("importer.asset_concurrency must be > 0"));
        }
        if importer.import_timeout_secs == 0
            || importer.asset_timeout_secs == 0
            || importer.listing_timeout_secs == 0
        {
            return Err(AppError::validation("importer timeouts must be > 0"));
        }
        if importer.retry_attempts == 0 {
            return Err(AppError::validation("importer.retry_attempts must be >= 1"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(AppError::validation("schedule time is out of range"));
        }
        if self.schedule.utc_offset().is_none() {
            return Err(AppError::validation("schedule.utc_offset_hours is out of range"));
        }
        if self.sources.iter().all(|s| !s.enabled) {
            return Err(AppError::validation("No enabled sources defined"));
        }
        for source in &self.sources {
            if source.max_import_workers == Some(0) {
                return Err(AppError::validation(format!(
                    "sources.{}.max_import_workers must be > 0",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a source entry by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            importer: ImporterConfig::default(),
            eligibility: EligibilityConfig::default(),
            schedule: ScheduleConfig::default(),
            segmenter: SegmenterConfig::default(),
            storage: StorageConfig::default(),
            http: HttpConfig::default(),
            sources: defaults::sources(),
        }
    }
}

/// Queue sizes, timeouts and retry policy for imports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImporterConfig {
    /// Global import queue concurrency
    #[serde(default = "defaults::global_concurrency")]
    pub global_concurrency: usize,

    /// Default per-source sub-queue concurrency
    #[serde(default = "defaults::per_source_concurrency")]
    pub per_source_concurrency: usize,

    /// Image asset sub-queue concurrency
    #[serde(default = "defaults::asset_concurrency")]
    pub asset_concurrency: usize,

    /// Time budget of one import attempt
    #[serde(default = "defaults::import_timeout")]
    pub import_timeout_secs: u64,

    /// Time budget for rewriting the images of one statement
    #[serde(default = "defaults::asset_timeout")]
    pub asset_timeout_secs: u64,

    /// Time budget of one source listing
    #[serde(default = "defaults::listing_timeout")]
    pub listing_timeout_secs: u64,

    /// Attempts per import task, including the first
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,

    /// Pause between attempts in milliseconds
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Shuffle eligible problems so sources interleave
    #[serde(default = "defaults::shuffle")]
    pub shuffle: bool,
}

impl ImporterConfig {
    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_timeout_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            global_concurrency: defaults::global_concurrency(),
            per_source_concurrency: defaults::per_source_concurrency(),
            asset_concurrency: defaults::asset_concurrency(),
            import_timeout_secs: defaults::import_timeout(),
            asset_timeout_secs: defaults::asset_timeout(),
            listing_timeout_secs: defaults::listing_timeout(),
            retry_attempts: defaults::retry_attempts(),
            retry_delay_ms: 0,
            shuffle: defaults::shuffle(),
        }
    }
}

/// Import eligibility thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Failed attempts after which a never-imported problem is given up on
    #[serde(default = "defaults::max_import_tries")]
    pub max_import_tries: u32,

    /// Problems older than this are not refreshed anymore
    #[serde(default = "defaults::stale_after_days")]
    pub stale_after_days: i64,

    /// Minimum age of the last update before a refresh
    #[serde(default = "defaults::refresh_after_days")]
    pub refresh_after_days: i64,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            max_import_tries: defaults::max_import_tries(),
            stale_after_days: defaults::stale_after_days(),
            refresh_after_days: defaults::refresh_after_days(),
        }
    }
}

/// Daily trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "defaults::schedule_hour")]
    pub hour: u32,

    #[serde(default)]
    pub minute: u32,

    /// Offset of the local clock the trigger time refers to
    #[serde(default = "defaults::utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Run a full sweep as soon as the daemon starts
    #[serde(default)]
    pub run_on_start: bool,
}

impl ScheduleConfig {
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: defaults::schedule_hour(),
            minute: 0,
            utc_offset_hours: defaults::utc_offset_hours(),
            run_on_start: false,
        }
    }
}

/// Merged-PDF segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Parent directory for per-run scratch folders (system temp if unset)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Bottom crop applied when a page footer is detected (points)
    #[serde(default = "defaults::footer_offset")]
    pub footer_offset: u32,

    /// Upper bound of the header binary search (points)
    #[serde(default = "defaults::max_offset")]
    pub max_offset: u32,

    /// Extra points added to the detected header height
    #[serde(default = "defaults::header_padding")]
    pub header_padding: u32,

    /// Points removed per metadata trimming step
    #[serde(default = "defaults::trim_step")]
    pub trim_step: u32,

    /// Upper bound on metadata trimming steps
    #[serde(default = "defaults::max_trim_iterations")]
    pub max_trim_iterations: u32,

    /// External tool binaries
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            footer_offset: defaults::footer_offset(),
            max_offset: defaults::max_offset(),
            header_padding: defaults::header_padding(),
            trim_step: defaults::trim_step(),
            max_trim_iterations: defaults::max_trim_iterations(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Names (or paths) of the document tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "defaults::pdftotext")]
    pub pdftotext: String,
    #[serde(default = "defaults::pdftk")]
    pub pdftk: String,
    #[serde(default = "defaults::pdfcrop")]
    pub pdfcrop: String,
    #[serde(default = "defaults::pdfjam")]
    pub pdfjam: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pdftotext: defaults::pdftotext(),
            pdftk: defaults::pdftk(),
            pdfcrop: defaults::pdfcrop(),
            pdfjam: defaults::pdfjam(),
        }
    }
}

/// Which blob store backend publishes artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

/// Repository and blob store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the problem repository and local artifacts
    #[serde(default = "defaults::root_dir")]
    pub root_dir: PathBuf,

    /// Base URL published local artifacts are served from
    #[serde(default)]
    pub public_base_url: Option<String>,

    #[serde(default)]
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: defaults::root_dir(),
            public_base_url: None,
            backend: StorageBackend::default(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// One registered judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Adapter name (e.g. "codeforces")
    pub name: String,

    /// Override of the judge's base URL
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Per-source import sub-queue concurrency
    #[serde(default)]
    pub max_import_workers: Option<usize>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            enabled: true,
            max_import_workers: None,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::SourceConfig;

    // Importer defaults
    pub fn global_concurrency() -> usize {
        50
    }
    pub fn per_source_concurrency() -> usize {
        10
    }
    pub fn asset_concurrency() -> usize {
        30
    }
    pub fn import_timeout() -> u64 {
        2 * 60
    }
    pub fn asset_timeout() -> u64 {
        2 * 60
    }
    pub fn listing_timeout() -> u64 {
        60 * 60
    }
    pub fn retry_attempts() -> u32 {
        3
    }
    pub fn shuffle() -> bool {
        true
    }

    // Eligibility defaults
    pub fn max_import_tries() -> u32 {
        10
    }
    pub fn stale_after_days() -> i64 {
        90
    }
    pub fn refresh_after_days() -> i64 {
        7
    }

    // Schedule defaults (03:00 in Recife)
    pub fn schedule_hour() -> u32 {
        3
    }
    pub fn utc_offset_hours() -> i32 {
        -3
    }

    // Segmenter defaults
    pub fn footer_offset() -> u32 {
        18
    }
    pub fn max_offset() -> u32 {
        256
    }
    pub fn header_padding() -> u32 {
        5
    }
    pub fn trim_step() -> u32 {
        8
    }
    pub fn max_trim_iterations() -> u32 {
        40
    }
    pub fn pdftotext() -> String {
        "pdftotext".into()
    }
    pub fn pdftk() -> String {
        "pdftk".into()
    }
    pub fn pdfcrop() -> String {
        "pdfcrop".into()
    }
    pub fn pdfjam() -> String {
        "pdfjam".into()
    }

    // Storage defaults
    pub fn root_dir() -> PathBuf {
        PathBuf::from("storage")
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; judge-importer/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    pub fn enabled() -> bool {
        true
    }

    pub fn sources() -> Vec<SourceConfig> {
        vec![
            SourceConfig::new("codeforces"),
            SourceConfig::new("timus"),
            SourceConfig {
                max_import_workers: Some(2),
                ..SourceConfig::new("cfgym")
            },
            SourceConfig::new("uva"),
        ]
    }
}
