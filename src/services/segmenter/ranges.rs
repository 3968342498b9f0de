// src/services/segmenter/ranges.rs

//! Grouping of merged-PDF pages into per-problem ranges.

use std::ops::RangeInclusive;

use crate::error::{AppError, Result};

/// Classification of one page of a merged PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    /// A metadata marker appears on the page head
    pub has_metadata: bool,
    /// Problem name announced on the page, if any
    pub name: Option<String>,
}

impl PageInfo {
    /// A page without metadata (continuation or empty page).
    pub fn continuation() -> Self {
        Self::default()
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self {
            has_metadata: true,
            name: Some(name.into()),
        }
    }
}

/// Pages of one problem inside a merged PDF (1-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRange {
    pub start_page: u32,
    pub end_page: u32,
    /// Name found on the first page, empty when none was recognised
    pub detected_name: String,
}

impl PageRange {
    pub fn pages(&self) -> RangeInclusive<u32> {
        self.start_page..=self.end_page
    }

    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page + 1
    }
}

/// Split pages into ranges: each metadata page opens a range that absorbs the
/// following non-metadata pages. Pages before the first metadata page (cover,
/// instructions) belong to no range.
pub fn detect_ranges(pages: &[PageInfo]) -> Vec<PageRange> {
    let mut ranges: Vec<PageRange> = Vec::new();
    for (index, page) in pages.iter().enumerate() {
        let number = index as u32 + 1;
        if page.has_metadata {
            ranges.push(PageRange {
                start_page: number,
                end_page: number,
                detected_name: page.name.clone().unwrap_or_default(),
            });
        } else if let Some(current) = ranges.last_mut() {
            current.end_page = number;
        }
    }
    ranges
}

/// Fail unless exactly `expected` ranges were detected.
pub fn check_count(ranges: &[PageRange], expected: usize) -> Result<()> {
    if ranges.len() != expected {
        return Err(AppError::SegmentationMismatch {
            expected,
            detected: ranges.len(),
        });
    }
    Ok(())
}
