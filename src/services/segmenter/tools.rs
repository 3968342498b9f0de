// src/services/segmenter/tools.rs

//! Document tool boundary.
//!
//! All PDF work goes through `DocumentTextExtractor`. `PopplerTools` drives
//! the usual command line tools:
//! - `pdftotext` for text extraction
//! - `pdftk` for page counts and splitting
//! - `pdfcrop` for margin cropping
//! - `pdfjam` for stacking pages

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::ToolsConfig;

/// PDF operations used by the segmenter.
///
/// Methods writing a document take the output path and return the path that
/// was written.
#[async_trait]
pub trait DocumentTextExtractor: Send + Sync {
    /// Plain text of the whole document, or of one 1-based page.
    async fn extract_text(&self, pdf: &Path, page: Option<u32>) -> Result<String>;

    async fn page_count(&self, pdf: &Path) -> Result<u32>;

    /// Cut `top` and `bottom` points off every page.
    async fn crop_margins(&self, pdf: &Path, top: u32, bottom: u32, output: &Path)
        -> Result<PathBuf>;

    /// Shrink every page to its content bounds.
    async fn auto_crop(&self, pdf: &Path, output: &Path) -> Result<PathBuf>;

    /// Stack `pages` vertically onto a single page.
    async fn merge_pages(&self, pages: &[PathBuf], output: &Path) -> Result<PathBuf>;

    /// Write one file per page into `out_dir`, in page order.
    async fn split_pages(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// `DocumentTextExtractor` backed by poppler, pdftk and TeX Live tools.
#[derive(Debug, Clone, Default)]
pub struct PopplerTools {
    tools: ToolsConfig,
}

impl PopplerTools {
    pub fn new(tools: ToolsConfig) -> Self {
        Self { tools }
    }

    /// Run `program` and return its stdout, failing on a non-zero exit.
    async fn run<I, S>(&self, program: &str, args: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::tool(program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::tool(
                program,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl DocumentTextExtractor for PopplerTools {
    async fn extract_text(&self, pdf: &Path, page: Option<u32>) -> Result<String> {
        let mut args: Vec<&OsStr> = Vec::new();
        let page = page.map(|n| n.to_string());
        if let Some(page) = &page {
            args.extend([OsStr::new("-f"), OsStr::new(page), OsStr::new("-l"), OsStr::new(page)]);
        }
        args.extend([pdf.as_os_str(), OsStr::new("-")]);

        let stdout = self.run(&self.tools.pdftotext, args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn page_count(&self, pdf: &Path) -> Result<u32> {
        let stdout = self
            .run(&self.tools.pdftk, [pdf.as_os_str(), OsStr::new("dump_data")])
            .await?;
        parse_page_count(&String::from_utf8_lossy(&stdout))
            .ok_or_else(|| AppError::tool(&self.tools.pdftk, "no NumberOfPages in dump_data"))
    }

    async fn crop_margins(
        &self,
        pdf: &Path,
        top: u32,
        bottom: u32,
        output: &Path,
    ) -> Result<PathBuf> {
        let margins = format!("0 -{top} 0 -{bottom}");
        self.run(
            &self.tools.pdfcrop,
            [
                OsStr::new("--margins"),
                OsStr::new(&margins),
                pdf.as_os_str(),
                output.as_os_str(),
            ],
        )
        .await?;
        Ok(output.to_path_buf())
    }

    async fn auto_crop(&self, pdf: &Path, output: &Path) -> Result<PathBuf> {
        self.run(&self.tools.pdfcrop, [pdf.as_os_str(), output.as_os_str()])
            .await?;
        Ok(output.to_path_buf())
    }

    async fn merge_pages(&self, pages: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if pages.is_empty() {
            return Err(AppError::tool(&self.tools.pdfjam, "no pages to merge"));
        }
        let nup = format!("1x{}", pages.len());
        let mut args: Vec<&OsStr> = pages.iter().map(|p| p.as_os_str()).collect();
        args.extend([
            OsStr::new("--nup"),
            OsStr::new(&nup),
            OsStr::new("--outfile"),
            output.as_os_str(),
        ]);
        self.run(&self.tools.pdfjam, args).await?;
        Ok(output.to_path_buf())
    }

    async fn split_pages(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let count = self.page_count(pdf).await?;
        tokio::fs::create_dir_all(out_dir).await?;
        let pattern = out_dir.join("%d.pdf");
        self.run(
            &self.tools.pdftk,
            [
                pdf.as_os_str(),
                OsStr::new("burst"),
                OsStr::new("output"),
                pattern.as_os_str(),
            ],
        )
        .await?;
        Ok((1..=count).map(|n| out_dir.join(format!("{n}.pdf"))).collect())
    }
}

/// Extract `NumberOfPages` from `pdftk dump_data` output.
fn parse_page_count(dump: &str) -> Option<u32> {
    dump.lines()
        .find_map(|line| line.strip_prefix("NumberOfPages:"))
        .and_then(|value| value.trim().parse().ok())
}
