//! Local filesystem storage implementation.
//!
//! Keeps the problem repository in a single JSON document and publishes
//! artifacts as plain files, for development and testing. Production
//! deployments publish through `S3Storage`.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Importer Configuration
//! ├── problems.json         # Problem repository
//! └── public/               # Published artifacts
//!     └── assets/...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Problem, ProblemKey};
use crate::storage::{
    AssetPublisher, ProblemQuery, ProblemRepository, PublishedAsset, PutOptions, stamp,
};

const PROBLEMS_KEY: &str = "problems.json";
const PUBLIC_DIR: &str = "public";

type ProblemMap = BTreeMap<ProblemKey, Problem>;

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    public_base_url: Option<String>,
    /// Lazily loaded repository contents; every save writes through.
    problems: Arc<Mutex<Option<ProblemMap>>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            public_base_url: None,
            problems: Arc::new(Mutex::new(None)),
        }
    }

    /// Serve published files under `base_url` instead of `file://` paths.
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_problems(&self) -> Result<ProblemMap> {
        let stored: Vec<Problem> = self
            .read_json(PROBLEMS_KEY)
            .await
            .map_err(|e| AppError::repository(format!("cannot read {PROBLEMS_KEY}: {e}")))?
            .unwrap_or_default();
        Ok(stored.into_iter().map(|p| (p.key(), p)).collect())
    }

    fn public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("file://{}", self.path(PUBLIC_DIR).join(key).display()),
        }
    }
}

#[async_trait]
impl ProblemRepository for LocalStorage {
    async fn find(&self, query: &ProblemQuery) -> Result<Vec<Problem>> {
        let mut guard = self.problems.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_problems().await?);
        }
        Ok(guard
            .iter()
            .flat_map(|map| map.values())
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }

    async fn save(&self, problem: &Problem) -> Result<()> {
        self.store(std::slice::from_ref(problem)).await.map(|_| ())
    }

    /// Inserts the whole batch with a single write of the repository.
    async fn insert_many(&self, problems: &[Problem]) -> Result<usize> {
        self.store(problems).await
    }
}

impl LocalStorage {
    /// Upsert `problems` and write the repository document once.
    async fn store(&self, problems: &[Problem]) -> Result<usize> {
        let mut guard = self.problems.lock().await;
        let mut map = match guard.take() {
            Some(map) => map,
            None => self.load_problems().await?,
        };

        let now = Utc::now();
        for problem in problems {
            let mut stored = problem.clone();
            if let Some(existing) = map.get(&stored.key()) {
                if stored.created_at.is_none() {
                    stored.created_at = existing.created_at;
                }
            }
            stamp(&mut stored, now);
            map.insert(stored.key(), stored);
        }

        let snapshot: Vec<&Problem> = map.values().collect();
        let written = self.write_json(PROBLEMS_KEY, &snapshot).await;
        *guard = Some(map);
        written
            .map(|_| problems.len())
            .map_err(|e| AppError::repository(format!("cannot write {PROBLEMS_KEY}: {e}")))
    }
}

#[async_trait]
impl AssetPublisher for LocalStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, options: &PutOptions) -> Result<PublishedAsset> {
        let relative = format!("{PUBLIC_DIR}/{key}");
        self.write_bytes(&relative, &bytes).await?;
        log::debug!(
            "Published {} ({} bytes, {})",
            key,
            bytes.len(),
            options.cache_control
        );
        Ok(PublishedAsset {
            key: key.to_string(),
            url: self.public_url(key),
        })
    }
}
