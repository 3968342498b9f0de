// src/services/segmenter/mod.rs

//! Merged-PDF segmentation.
//!
//! Splits one problem-set PDF into one cropped PDF per problem:
//! 1. classify every page by its metadata markers and group pages into ranges
//! 2. detect a running footer and the running header height on a sample page
//! 3. per range: crop, stack the pages, shrink to content, then trim the
//!    problem's own metadata block off the top
//!
//! Scratch files live in a per-run temporary directory that is removed when
//! the returned `Segmentation` (or the failed run) is dropped.

mod language;
mod markers;
mod ranges;
mod search;
mod tools;

pub use language::detect_language;
pub use markers::{HEAD_LINES, MarkerGrammar, head};
pub use ranges::{PageInfo, PageRange, check_count, detect_ranges};
pub use search::{bisect, header_offset};
pub use tools::{DocumentTextExtractor, PopplerTools};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::error::{AppError, Result};
use crate::models::SegmenterConfig;
use crate::utils::http::Fetcher;

/// Lines checked for leftover metadata while trimming a rendered problem.
const TOP_LINES: usize = 5;

/// One rendered problem.
#[derive(Debug, Clone)]
pub struct SegmentedProblem {
    pub path: PathBuf,
    pub range: PageRange,
}

/// Result of one segmentation run.
///
/// Owns the scratch directory holding the rendered PDFs; dropping it removes
/// every file of the run.
#[derive(Debug)]
pub struct Segmentation {
    work_dir: TempDir,
    pub problems: Vec<SegmentedProblem>,
    pub language: String,
}

impl Segmentation {
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }
}

/// Segments merged problem-set PDFs.
pub struct PdfSegmenter {
    extractor: Arc<dyn DocumentTextExtractor>,
    fetcher: Arc<dyn Fetcher>,
    grammar: MarkerGrammar,
    config: SegmenterConfig,
}

impl PdfSegmenter {
    pub fn new(
        extractor: Arc<dyn DocumentTextExtractor>,
        fetcher: Arc<dyn Fetcher>,
        config: SegmenterConfig,
    ) -> Result<Self> {
        Ok(Self {
            extractor,
            fetcher,
            grammar: MarkerGrammar::new()?,
            config,
        })
    }

    /// Download the merged PDF at `url` and split it into `expected` problems.
    pub async fn segment_url(&self, url: &str, expected: usize) -> Result<Segmentation> {
        let work_dir = self.scratch_dir().await?;
        log::info!("Loading {}...", url);
        let resource = self.fetcher.fetch(url).await?;
        let merged = work_dir.path().join("all.pdf");
        tokio::fs::write(&merged, &resource.bytes).await?;
        self.segment_in(work_dir, &merged, expected).await
    }

    /// Split a local merged PDF into `expected` problems.
    pub async fn segment_file(&self, pdf: &Path, expected: usize) -> Result<Segmentation> {
        let work_dir = self.scratch_dir().await?;
        let merged = work_dir.path().join("all.pdf");
        tokio::fs::copy(pdf, &merged).await?;
        self.segment_in(work_dir, &merged, expected).await
    }

    async fn scratch_dir(&self) -> Result<TempDir> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("pdf");
            builder
        };
        let dir = match &self.config.work_dir {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    async fn segment_in(
        &self,
        work_dir: TempDir,
        merged: &Path,
        expected: usize,
    ) -> Result<Segmentation> {
        let dir = work_dir.path();
        let page_count = self.extractor.page_count(merged).await?;

        let mut pages = Vec::with_capacity(page_count as usize);
        for page in 1..=page_count {
            let text = self.extractor.extract_text(merged, Some(page)).await?;
            pages.push(self.classify(&text));
        }

        let ranges = detect_ranges(&pages);
        check_count(&ranges, expected)?;
        let Some(first) = ranges.first() else {
            return Err(AppError::content(
                merged.display().to_string(),
                "no problem headers found",
            ));
        };
        log::debug!("Detected {} problems in {} pages", ranges.len(), page_count);

        let page_files = self
            .extractor
            .split_pages(merged, &dir.join("pages"))
            .await?;
        let sample = page_file(&page_files, first.start_page)?;
        let sample_text = self.extractor.extract_text(sample, None).await?;

        let bottom = if self.grammar.has_footer(&sample_text) {
            self.config.footer_offset
        } else {
            0
        };
        let top = self.detect_header(sample, dir).await;
        let language = detect_language(&sample_text).to_string();
        log::debug!(
            "Cropping {}pt header and {}pt footer, language {}",
            top,
            bottom,
            language
        );

        let mut problems = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.into_iter().enumerate() {
            let path = self
                .render_range(index, &range, &page_files, top, bottom, dir)
                .await?;
            problems.push(SegmentedProblem { path, range });
        }

        Ok(Segmentation {
            work_dir,
            problems,
            language,
        })
    }

    /// Classify one page by the markers on its head. Empty pages count as
    /// continuations.
    pub fn classify(&self, text: &str) -> PageInfo {
        let lines = head(text, HEAD_LINES);
        PageInfo {
            has_metadata: self.grammar.has_metadata(&lines),
            name: self.grammar.find_name(&lines),
        }
    }

    async fn detect_header(&self, sample: &Path, dir: &Path) -> u32 {
        let extractor = self.extractor.as_ref();
        let grammar = &self.grammar;
        header_offset(
            self.config.max_offset,
            self.config.header_padding,
            move |k, lines| {
                let cropped_path = dir.join(format!("margin-{k}.pdf"));
                async move {
                    let cropped = extractor.crop_margins(sample, k, 0, &cropped_path).await?;
                    let text = extractor.extract_text(&cropped, None).await?;
                    Ok::<bool, AppError>(grammar.find_name(&head(&text, lines)).is_some())
                }
            },
        )
        .await
    }

    async fn render_range(
        &self,
        index: usize,
        range: &PageRange,
        page_files: &[PathBuf],
        top: u32,
        bottom: u32,
        dir: &Path,
    ) -> Result<PathBuf> {
        let mut cropped = Vec::with_capacity(range.page_count() as usize);
        for page in range.pages() {
            let source = page_file(page_files, page)?;
            let target = dir.join(format!("crop-{page}.pdf"));
            cropped.push(
                self.extractor
                    .crop_margins(source, top, bottom, &target)
                    .await?,
            );
        }

        let merged = self
            .extractor
            .merge_pages(&cropped, &dir.join(format!("merged-{index}.pdf")))
            .await?;
        let base = self
            .extractor
            .auto_crop(&merged, &dir.join(format!("p{index}.pdf")))
            .await?;
        self.trim_metadata(index, base, dir).await
    }

    /// Crop the top in `trim_step` increments until no metadata marker is
    /// left on the first lines.
    async fn trim_metadata(&self, index: usize, base: PathBuf, dir: &Path) -> Result<PathBuf> {
        let mut current = base.clone();
        for step in 1..=self.config.max_trim_iterations {
            let text = self.extractor.extract_text(&current, None).await?;
            if !self.grammar.has_metadata(&head(&text, TOP_LINES)) {
                return Ok(current);
            }
            let target = dir.join(format!("p{index}-trim{step}.pdf"));
            current = self
                .extractor
                .crop_margins(&base, self.config.trim_step * step, 0, &target)
                .await?;
        }
        log::warn!(
            "Metadata still present on problem {} after {} trims",
            index + 1,
            self.config.max_trim_iterations
        );
        Ok(current)
    }
}

fn page_file(page_files: &[PathBuf], page: u32) -> Result<&Path> {
    (page as usize)
        .checked_sub(1)
        .and_then(|index| page_files.get(index))
        .map(PathBuf::as_path)
        .ok_or_else(|| AppError::tool("split", format!("page {page} was not extracted")))
}
