//! Storage abstractions for problems and published artifacts.
//!
//! Two collaborators sit behind traits so the import pipeline never touches a
//! concrete backend:
//! - `ProblemRepository`: the problem documents (`find` / `save`)
//! - `AssetPublisher`: the public blob store (`put`)
//!
//! ## Key Layout
//!
//! ```text
//! assets/
//! ├── problems/{source}/{id}.html    # HTML statements (2 weeks cache)
//! ├── problems/{source}/{id}.pdf     # Segmented PDF statements (1 year cache)
//! └── images/{source}/{id}_{hash}.{ext}
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::Problem;

// Re-export for convenience
pub use local::LocalStorage;

/// Selects problems from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProblemQuery {
    /// Every stored problem
    All,
    /// Problems segmented from the same merged PDF
    ByOriginalUrl(String),
}

impl ProblemQuery {
    pub fn matches(&self, problem: &Problem) -> bool {
        match self {
            Self::All => true,
            Self::ByOriginalUrl(url) => problem.original_url.as_deref() == Some(url.as_str()),
        }
    }
}

/// Trait for problem repositories.
#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Return the problems matching `query`.
    async fn find(&self, query: &ProblemQuery) -> Result<Vec<Problem>>;

    /// Insert or overwrite a problem, keyed by `(source, id)`.
    ///
    /// Implementations stamp `created_at` on first write and `updated_at` on
    /// every write.
    async fn save(&self, problem: &Problem) -> Result<()>;

    /// Insert new problems one by one; a failed insert does not stop the rest.
    ///
    /// Returns the number of problems stored.
    async fn insert_many(&self, problems: &[Problem]) -> Result<usize> {
        let mut stored = 0;
        for problem in problems {
            match self.save(problem).await {
                Ok(()) => stored += 1,
                Err(e) => log::warn!("Failed to insert {}: {}", problem.key(), e),
            }
        }
        Ok(stored)
    }
}

/// Upload options for a published object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// Readable without credentials
    pub public: bool,
    pub cache_control: String,
    pub content_type: Option<String>,
}

impl PutOptions {
    /// Immutable artifacts (images, PDFs): cached for a year.
    pub fn immutable(content_type: Option<&str>) -> Self {
        Self {
            public: true,
            cache_control: "max-age=31536000".to_string(),
            content_type: content_type.map(str::to_string),
        }
    }

    /// HTML statements: refreshed periodically, cached for two weeks.
    pub fn html() -> Self {
        Self {
            public: true,
            cache_control: "max-age=1209600".to_string(),
            content_type: Some("text/html; charset=utf-8".to_string()),
        }
    }
}

/// Location of a published object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedAsset {
    pub key: String,
    pub url: String,
}

/// Trait for blob stores that publish artifacts.
#[async_trait]
pub trait AssetPublisher: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, options: &PutOptions) -> Result<PublishedAsset>;
}

/// Stamp document timestamps before a write.
pub(crate) fn stamp(problem: &mut Problem, now: DateTime<Utc>) {
    if problem.created_at.is_none() {
        problem.created_at = Some(now);
    }
    problem.updated_at = Some(now);
}

/// Object keys for published artifacts.
pub mod keys {
    use sha2::{Digest, Sha256};

    pub fn problem_html(source: &str, id: &str) -> String {
        format!("assets/problems/{source}/{id}.html")
    }

    pub fn problem_pdf(source: &str, id: &str) -> String {
        format!("assets/problems/{source}/{id}.pdf")
    }

    /// Image key, unique per problem and source URI. `ext` includes the dot
    /// or is empty.
    pub fn image(source: &str, id: &str, uri: &str, ext: &str) -> String {
        let digest = hex::encode(Sha256::digest(uri.as_bytes()));
        format!("assets/images/{source}/{id}_{}{ext}", &digest[..5])
    }
}
