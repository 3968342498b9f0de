// src/sources/mod.rs

//! Judge source adapters.
//!
//! Every judge the importer knows is a `SourceAdapter`. The adapters own the
//! markup rules of their site; the pipeline only sees listings and imported
//! data.

mod cfgym;
mod codeforces;
mod timus;
mod uva;

pub use cfgym::CodeforcesGymAdapter;
pub use codeforces::CodeforcesAdapter;
pub use timus::TimusAdapter;
pub use uva::UvaAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{Config, ImportOutcome, ImportedData, Problem, ProblemListing};

/// One judge website.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source identifier stored in `Problem::source`.
    fn name(&self) -> &str;

    /// Every problem the judge currently publishes.
    async fn list_problems(&self) -> Result<Vec<ProblemListing>>;

    /// Fetch the statement and metadata of one problem.
    async fn import_one(&self, problem: &Problem) -> Result<ImportedData>;

    /// Statement page URL, used to resolve relative image sources.
    fn problem_url(&self, _problem: &Problem) -> Option<String> {
        None
    }

    /// Direct download URL of a single-problem PDF statement.
    fn pdf_url(&self, _problem: &Problem) -> Option<String> {
        None
    }

    /// Custom handling of a merged-PDF problem, bypassing the segmenter.
    ///
    /// `None` lets the pipeline segment the merged PDF itself.
    async fn import_pdf_batch(&self, _problem: &Problem) -> Option<Result<ImportOutcome>> {
        None
    }
}

/// Registered adapters by source name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the adapters of every enabled source in `config`.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self> {
        let mut registry = Self::new();
        for source in config.sources.iter().filter(|s| s.enabled) {
            let base_url = source.base_url.as_deref();
            let adapter: Arc<dyn SourceAdapter> = match source.name.as_str() {
                "codeforces" => Arc::new(CodeforcesAdapter::new(client.clone(), base_url)?),
                "timus" => Arc::new(TimusAdapter::new(client.clone(), base_url)?),
                "cfgym" => Arc::new(CodeforcesGymAdapter::new(client.clone(), base_url)?),
                "uva" => Arc::new(UvaAdapter::new(client.clone(), base_url)?),
                other => {
                    return Err(AppError::config(format!("Unknown source: {other}")));
                }
            };
            registry.register(adapter);
        }
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, source: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(source).cloned()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.adapters.contains_key(source)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
        self.adapters.values()
    }

    /// Source names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Escape `<` characters that cannot open a tag, as some judges print raw
/// inequalities inside statements.
pub(crate) fn escape_stray_lt(html: &str) -> String {
    match Regex::new(r"<([^a-zA-Z\s/\\!])") {
        Ok(re) => re.replace_all(html, "&lt;$1").into_owned(),
        Err(_) => html.to_string(),
    }
}

/// Parse a limit like "2 seconds" or "1.5 s" into seconds.
pub(crate) fn parse_seconds(text: &str) -> Option<f64> {
    text.split_whitespace()
        .find_map(|token| token.replace(',', ".").parse::<f64>().ok())
}
