// src/services/segmenter/markers.rs

//! Metadata-marker grammar for merged problem-set PDFs.
//!
//! Problem sets print a small metadata block at the start of every problem
//! ("Problem A. Name", "Time limit: 1 s", "Arquivo-fonte: a.c", ...). The
//! grammar recognises those lines in English and Portuguese.

use regex::Regex;

use crate::error::Result;

/// Lines inspected at the top of a page.
pub const HEAD_LINES: usize = 15;

/// Non-blank lines inspected at the bottom of a page for a footer.
const FOOTER_LINES: usize = 5;

/// Longest plausible problem name; longer matches are body text.
const MAX_NAME_LEN: usize = 50;

/// Compiled marker patterns.
#[derive(Debug, Clone)]
pub struct MarkerGrammar {
    name: Regex,
    name_on_next_line: Regex,
    metadata: Vec<Regex>,
    footers: Vec<Regex>,
}

impl MarkerGrammar {
    pub fn new() -> Result<Self> {
        let name = Regex::new(r"^\s*Problema?\s*([\w\d]{0,3})[.:]\s*(.+)?\s*$")?;
        // The name pattern also covers "Problem ID: ..." lines.
        let metadata = vec![
            name.clone(),
            Regex::new(r"^\s*Time[^:]{0,10}:")?,
            Regex::new(r"^\s*Limite\s*de\s*tempo[^:]{0,10}:")?,
            Regex::new(r"^\s*Memory[^:]{0,10}:")?,
            Regex::new(r"^\s*Input[^:]{0,10}:")?,
            Regex::new(r"^\s*Output[^:]{0,10}:")?,
            Regex::new(r"^\s*Arquivo-fonte[^:]{0,10}:")?,
        ];
        Ok(Self {
            name,
            name_on_next_line: Regex::new(r"^\s*Problema?\s*([A-Z]|[1-9]{1,2})\s*$")?,
            metadata,
            footers: vec![
                Regex::new(r"\s*Page\s+\d+")?,
                Regex::new(r"^\s*P[aá]gina\s*\d*")?,
            ],
        })
    }

    /// Whether `line` is a metadata line.
    pub fn is_metadata(&self, line: &str) -> bool {
        self.metadata.iter().any(|pattern| pattern.is_match(line))
    }

    pub fn has_metadata(&self, lines: &[&str]) -> bool {
        lines.iter().any(|line| self.is_metadata(line))
    }

    /// First problem name announced in `lines`.
    ///
    /// Handles both "Problem A. Name" and a bare "Problem A" with the name on
    /// the following line.
    pub fn find_name(&self, lines: &[&str]) -> Option<String> {
        lines.iter().enumerate().find_map(|(i, line)| {
            let candidate = if let Some(caps) = self.name.captures(line) {
                caps.get(2).map(|m| m.as_str())
            } else if self.name_on_next_line.is_match(line) {
                lines.get(i + 1).copied()
            } else {
                None
            };
            candidate
                .map(str::trim)
                .filter(|name| !name.is_empty() && name.chars().count() <= MAX_NAME_LEN)
                .map(str::to_string)
        })
    }

    /// Whether the last non-blank lines of `text` carry a page footer.
    pub fn has_footer(&self, text: &str) -> bool {
        let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
        let tail = &lines[lines.len().saturating_sub(FOOTER_LINES)..];
        tail.iter()
            .any(|line| self.footers.iter().any(|footer| footer.is_match(line)))
    }
}

/// The first `n` lines of `text`.
pub fn head(text: &str, n: usize) -> Vec<&str> {
    text.lines().take(n).collect()
}
