// src/models/problem.rs

//! Problem data structures.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Globally unique identity of a problem: the judge it comes from and the
/// judge's native identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProblemKey {
    pub source: String,
    pub id: String,
}

impl ProblemKey {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ProblemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.id)
    }
}

/// A single judge problem as stored in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Judge identifier (e.g. "codeforces")
    pub source: String,

    /// Judge-native problem identifier
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub imported: bool,

    /// Failed import attempts so far
    #[serde(default)]
    pub import_tries: u32,

    #[serde(default)]
    pub import_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// Published artifact location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Statement body, only present between import and publish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    #[serde(default)]
    pub is_pdf: bool,

    /// Merged PDF this problem is segmented from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,

    /// Secondary id used to group merged-PDF problems
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Time limit in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timelimit: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memorylimit: Option<String>,

    /// Contest or book the problem originally appeared in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    /// Statement language detected during segmentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Problem {
    /// Create a fresh, never-imported problem.
    pub fn new(source: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
            name: name.into(),
            imported: false,
            import_tries: 0,
            import_date: None,
            created_at: None,
            updated_at: None,
            url: None,
            html: None,
            is_pdf: false,
            original_url: None,
            sid: None,
            timelimit: None,
            memorylimit: None,
            origin: None,
            input_file: None,
            output_file: None,
            language: None,
        }
    }

    pub fn key(&self) -> ProblemKey {
        ProblemKey::new(&self.source, &self.id)
    }

    /// Merge the fields returned by an adapter import into this problem.
    pub fn apply(&mut self, data: ImportedData) {
        if data.html.is_some() {
            self.html = data.html;
        }
        if data.is_pdf {
            self.is_pdf = true;
        }
        if data.original_url.is_some() {
            self.original_url = data.original_url;
        }
        if data.sid.is_some() {
            self.sid = data.sid;
        }
        if data.timelimit.is_some() {
            self.timelimit = data.timelimit;
        }
        if data.memorylimit.is_some() {
            self.memorylimit = data.memorylimit;
        }
        if data.origin.is_some() {
            self.origin = data.origin;
        }
        if data.input_file.is_some() {
            self.input_file = data.input_file;
        }
        if data.output_file.is_some() {
            self.output_file = data.output_file;
        }
    }

    /// Record a successful publish.
    pub fn mark_imported(&mut self, url: impl Into<String>, now: DateTime<Utc>) {
        self.url = Some(url.into());
        self.import_date = Some(now);
        self.imported = true;
        self.html = None;
    }

    /// Record a failed import attempt.
    pub fn record_failure(&mut self) {
        self.import_tries += 1;
    }

    /// Replace a placeholder name (e.g. "A") with a detected one.
    ///
    /// Only names of at most two characters are replaced, and only by a
    /// detected name longer than that.
    pub fn backfill_name(&mut self, detected: &str) -> bool {
        let detected = detected.trim();
        if self.name.chars().count() <= 2 && detected.chars().count() > 2 {
            self.name = detected.to_string();
            return true;
        }
        false
    }

    /// Order problems by id, numerically when both ids are numbers.
    pub fn cmp_ids(a: &str, b: &str) -> Ordering {
        match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        }
    }
}

/// A problem as reported by a source listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemListing {
    pub source: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_pdf: bool,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub timelimit: Option<f64>,
    #[serde(default)]
    pub memorylimit: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

impl ProblemListing {
    pub fn new(source: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
            name: name.into(),
            is_pdf: false,
            original_url: None,
            sid: None,
            timelimit: None,
            memorylimit: None,
            origin: None,
        }
    }

    pub fn key(&self) -> ProblemKey {
        ProblemKey::new(&self.source, &self.id)
    }
}

impl From<ProblemListing> for Problem {
    fn from(listing: ProblemListing) -> Self {
        let mut problem = Problem::new(listing.source, listing.id, listing.name);
        problem.is_pdf = listing.is_pdf;
        problem.original_url = listing.original_url;
        problem.sid = listing.sid;
        problem.timelimit = listing.timelimit;
        problem.memorylimit = listing.memorylimit;
        problem.origin = listing.origin;
        problem
    }
}

/// Data returned by a source adapter when importing one problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedData {
    pub html: Option<String>,
    pub is_pdf: bool,
    pub timelimit: Option<f64>,
    pub memorylimit: Option<String>,
    pub origin: Option<String>,
    pub original_url: Option<String>,
    pub sid: Option<String>,
    pub input_file: Option<String>,
    pub output_file: Option<String>,
}

impl ImportedData {
    /// Statement served as HTML.
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: Some(html.into()),
            ..Self::default()
        }
    }

    /// Statement living inside a merged PDF.
    pub fn merged_pdf(original_url: impl Into<String>) -> Self {
        Self {
            is_pdf: true,
            original_url: Some(original_url.into()),
            ..Self::default()
        }
    }
}

/// Result of one import task that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The artifact was published and the problem saved
    Published { url: String },
    /// Nothing to do for this problem right now
    Skipped,
}
