//! Shared fakes for the integration tests.
//!
//! Fake "PDFs" are UTF-8 text files with pages separated by form feeds.
//! Every line is 12pt tall, so cropping `k` points off the top hides the
//! first `ceil(k / 12)` lines of each page.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use judge_importer::error::{AppError, Result};
use judge_importer::models::{Config, ImportOutcome, ImportedData, Problem, ProblemListing};
use judge_importer::services::{DocumentTextExtractor, ProblemImporter};
use judge_importer::sources::SourceAdapter;
use judge_importer::storage::LocalStorage;
use judge_importer::utils::http::{FetchedResource, Fetcher};
use tempfile::TempDir;

pub const LINE_HEIGHT: u32 = 12;
pub const PAGE_BREAK: char = '\u{c}';

fn read_pages(text: &str) -> Vec<Vec<String>> {
    text.split(PAGE_BREAK)
        .map(|page| page.lines().map(str::to_string).collect())
        .collect()
}

fn write_pages(pages: &[Vec<String>]) -> String {
    pages
        .iter()
        .map(|lines| lines.join("\n"))
        .collect::<Vec<_>>()
        .join(&PAGE_BREAK.to_string())
}

fn lines_under(points: u32) -> usize {
    points.div_ceil(LINE_HEIGHT) as usize
}

/// Text-backed `DocumentTextExtractor`.
#[derive(Default)]
pub struct TextPdfTools {
    pub page_counts: AtomicUsize,
    /// Time spent counting pages
    delay: Option<Duration>,
}

impl TextPdfTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    async fn read(&self, pdf: &Path) -> Result<Vec<Vec<String>>> {
        Ok(read_pages(&tokio::fs::read_to_string(pdf).await?))
    }

    async fn write(&self, pages: &[Vec<String>], output: &Path) -> Result<PathBuf> {
        tokio::fs::write(output, write_pages(pages)).await?;
        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl DocumentTextExtractor for TextPdfTools {
    async fn extract_text(&self, pdf: &Path, page: Option<u32>) -> Result<String> {
        let pages = self.read(pdf).await?;
        match page {
            Some(n) => pages
                .get((n as usize).saturating_sub(1))
                .map(|lines| lines.join("\n"))
                .ok_or_else(|| AppError::tool("extract", format!("no page {n}"))),
            None => Ok(write_pages(&pages)),
        }
    }

    async fn page_count(&self, pdf: &Path) -> Result<u32> {
        self.page_counts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.read(pdf).await?.len() as u32)
    }

    async fn crop_margins(&self, pdf: &Path, top: u32, bottom: u32, output: &Path) -> Result<PathBuf> {
        let pages: Vec<Vec<String>> = self
            .read(pdf)
            .await?
            .into_iter()
            .map(|lines| {
                let start = lines_under(top).min(lines.len());
                let end = lines.len().saturating_sub(lines_under(bottom)).max(start);
                lines[start..end].to_vec()
            })
            .collect();
        self.write(&pages, output).await
    }

    async fn auto_crop(&self, pdf: &Path, output: &Path) -> Result<PathBuf> {
        let pages: Vec<Vec<String>> = self
            .read(pdf)
            .await?
            .into_iter()
            .map(|lines| {
                let start = lines.iter().position(|l| !l.trim().is_empty()).unwrap_or(lines.len());
                let end = lines.iter().rposition(|l| !l.trim().is_empty()).map_or(start, |i| i + 1);
                lines[start..end].to_vec()
            })
            .collect();
        self.write(&pages, output).await
    }

    async fn merge_pages(&self, pages: &[PathBuf], output: &Path) -> Result<PathBuf> {
        let mut stacked = Vec::new();
        for page in pages {
            for lines in self.read(page).await? {
                stacked.extend(lines);
            }
        }
        self.write(&[stacked], output).await
    }

    async fn split_pages(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(out_dir).await?;
        let mut files = Vec::new();
        for (index, lines) in self.read(pdf).await?.into_iter().enumerate() {
            let path = out_dir.join(format!("{}.pdf", index + 1));
            files.push(self.write(&[lines], &path).await?);
        }
        Ok(files)
    }
}

/// Serves fixed bodies by URL and counts requests.
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, FetchedResource>,
    pub requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, content_type: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(
            url.to_string(),
            FetchedResource {
                content_type: Some(content_type.to_string()),
                bytes: bytes.into(),
            },
        );
        self
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResource> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::fetch(url, "404 Not Found"))
    }
}

/// How a fake source answers `import_one`.
#[derive(Clone)]
pub enum Statement {
    Html(String),
    MergedPdf(String),
    /// Single-problem PDF served at the source's `pdf_url`
    Pdf,
    /// Sleeps before answering
    Slow(Duration),
    /// Network failure on every attempt
    Offline,
    Missing,
}

/// How a fake source handles merged PDFs itself.
#[derive(Clone, Copy)]
pub enum BatchReply {
    Skipped,
    Fails,
}

/// Scriptable `SourceAdapter`.
pub struct FakeSource {
    name: String,
    listings: Vec<ProblemListing>,
    listing_delay: Option<Duration>,
    fail_listing: bool,
    statements: HashMap<String, Statement>,
    pdf_urls: HashMap<String, String>,
    batch_reply: Option<BatchReply>,
    pub imports: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            listings: Vec::new(),
            listing_delay: None,
            fail_listing: false,
            statements: HashMap::new(),
            pdf_urls: HashMap::new(),
            batch_reply: None,
            imports: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn pdf(mut self, id: &str, url: &str) -> Self {
        self.statements.insert(id.to_string(), Statement::Pdf);
        self.pdf_urls.insert(id.to_string(), url.to_string());
        self
    }

    pub fn handles_batches(mut self, reply: BatchReply) -> Self {
        self.batch_reply = Some(reply);
        self
    }

    pub fn listing(mut self, id: &str, name: &str) -> Self {
        self.listings.push(ProblemListing::new(&self.name, id, name));
        self
    }

    pub fn statement(mut self, id: &str, statement: Statement) -> Self {
        self.statements.insert(id.to_string(), statement);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn slow_listing(mut self, delay: Duration) -> Self {
        self.listing_delay = Some(delay);
        self
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_problems(&self) -> Result<Vec<ProblemListing>> {
        if let Some(delay) = self.listing_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing {
            return Err(AppError::fetch(&self.name, "connection reset"));
        }
        Ok(self.listings.clone())
    }

    async fn import_one(&self, problem: &Problem) -> Result<ImportedData> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        match self.statements.get(&problem.id).cloned().unwrap_or(Statement::Missing) {
            Statement::Html(html) => Ok(ImportedData::html(html)),
            Statement::MergedPdf(url) => Ok(ImportedData::merged_pdf(url)),
            Statement::Pdf => Ok(ImportedData {
                is_pdf: true,
                ..ImportedData::default()
            }),
            Statement::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ImportedData::html("<p>late</p>"))
            }
            Statement::Offline => Err(AppError::fetch(problem.key().to_string(), "connection refused")),
            Statement::Missing => Err(AppError::content(problem.key().to_string(), "statement not found")),
        }
    }

    fn pdf_url(&self, problem: &Problem) -> Option<String> {
        self.pdf_urls.get(&problem.id).cloned()
    }

    async fn import_pdf_batch(&self, problem: &Problem) -> Option<Result<ImportOutcome>> {
        let reply = self.batch_reply?;
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Some(match reply {
            BatchReply::Skipped => Ok(ImportOutcome::Skipped),
            BatchReply::Fails => Err(AppError::content(problem.key().to_string(), "contest archive unavailable")),
        })
    }
}

/// One merged-PDF page: running header, optional problem block, body and
/// page footer.
pub fn pdf_page(number: u32, problem: Option<(&str, &str)>, body: &str) -> String {
    let mut lines = vec!["Latin America Regional Contest 2018".to_string()];
    if let Some((letter, name)) = problem {
        lines.push(format!("Problem {letter}. {name}"));
        lines.push("Time limit: 1 second".to_string());
        lines.push("Memory limit: 256 megabytes".to_string());
    }
    lines.push(format!("{body} is the subject of this page and each line of it."));
    lines.push("The input has one line with a number.".to_string());
    lines.push(String::new());
    lines.push(format!("Page {number}"));
    lines.join("\n")
}

/// Seven pages with problems starting on pages 1, 3 and 5.
pub fn seven_page_set() -> String {
    [
        pdf_page(1, Some(("A", "Alpha")), "Alpha"),
        pdf_page(2, None, "Alpha continued"),
        pdf_page(3, Some(("B", "Bravo")), "Bravo"),
        pdf_page(4, None, "Bravo continued"),
        pdf_page(5, Some(("C", "Charlie")), "Charlie"),
        pdf_page(6, None, "Charlie continued"),
        pdf_page(7, None, "Charlie appendix"),
    ]
    .join(&PAGE_BREAK.to_string())
}

/// Test configuration: no shuffling, no retry delay, scratch under `work`.
pub fn test_config(work: &Path) -> Config {
    let mut config = Config::default();
    config.importer.shuffle = false;
    config.importer.retry_delay_ms = 0;
    config.segmenter.work_dir = Some(work.to_path_buf());
    config
}

/// Everything an import test needs, rooted in temporary directories.
pub struct Harness {
    pub storage_dir: TempDir,
    pub work_dir: TempDir,
    pub storage: LocalStorage,
    pub tools: Arc<TextPdfTools>,
    pub fetcher: Arc<StaticFetcher>,
    pub config: Config,
}

impl Harness {
    pub fn new(fetcher: StaticFetcher) -> Self {
        Self::with_tools(fetcher, TextPdfTools::new())
    }

    pub fn with_tools(fetcher: StaticFetcher, tools: TextPdfTools) -> Self {
        let storage_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(storage_dir.path()).with_public_base_url("https://cdn.test");
        let config = test_config(work_dir.path());
        Self {
            storage_dir,
            work_dir,
            storage,
            tools: Arc::new(tools),
            fetcher: Arc::new(fetcher),
            config,
        }
    }

    pub fn importer(&self) -> ProblemImporter {
        ProblemImporter::new(
            &self.config,
            Arc::new(self.storage.clone()),
            Arc::new(self.storage.clone()),
            self.fetcher.clone(),
            self.tools.clone(),
        )
        .unwrap()
    }

    /// Path of a published artifact.
    pub fn published(&self, key: &str) -> PathBuf {
        self.storage_dir.path().join("public").join(key)
    }

    /// Files left in the segmenter scratch directory.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.work_dir.path()).map(|d| d.count()).unwrap_or(0)
    }
}
