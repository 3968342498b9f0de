// src/sources/codeforces.rs

//! Codeforces problemset adapter.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

use super::{SourceAdapter, escape_stray_lt, parse_seconds};
use crate::error::{AppError, Result};
use crate::models::{ImportedData, Problem, ProblemListing};
use crate::utils::http::fetch_text;

const SOURCE: &str = "codeforces";
const DEFAULT_BASE_URL: &str = "https://codeforces.com";
const PROBLEMSET_API: &str = "/api/problemset.problems";
const LIMITED_LANG_PATTERN: &str = "following languages are only available languages";

const MATHJAX_HEADER: &str = r#"<script type="text/javascript">
  window.MathJax = {
    tex: { inlineMath: [['$$$', '$$$']], displayMath: [['$$$$$$', '$$$$$$']] }
  };
</script>
<script type="text/javascript" async src="//cdnjs.cloudflare.com/ajax/libs/mathjax/3.2.2/es5/tex-mml-chtml.min.js"></script>"#;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    #[serde(default)]
    comment: Option<String>,
    result: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, context: &str) -> Result<T> {
        match (self.status.as_str(), self.result) {
            ("OK", Some(result)) => Ok(result),
            _ => Err(AppError::content(
                context,
                self.comment.unwrap_or_else(|| format!("API status {}", self.status)),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Problemset {
    problems: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProblem {
    contest_id: Option<u64>,
    index: String,
    name: String,
}

/// Adapter for the main Codeforces problemset.
pub struct CodeforcesAdapter {
    client: Client,
    base_url: Url,
}

impl CodeforcesAdapter {
    pub fn new(client: Client, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?,
        })
    }

    fn url(&self, path: &str) -> Result<String> {
        Ok(self.base_url.join(path)?.to_string())
    }
}

#[async_trait]
impl SourceAdapter for CodeforcesAdapter {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn list_problems(&self) -> Result<Vec<ProblemListing>> {
        let url = self.url(PROBLEMSET_API)?;
        let body = fetch_text(&self.client, &url).await?;
        let response: ApiResponse<Problemset> =
            serde_json::from_str(&body).map_err(|e| AppError::content(&url, e))?;
        let problemset = response.into_result(&url)?;

        // The API lists newest first
        Ok(problemset
            .problems
            .into_iter()
            .rev()
            .filter_map(|p| {
                let contest = p.contest_id?;
                Some(ProblemListing::new(SOURCE, format!("{contest}{}", p.index), p.name))
            })
            .collect())
    }

    async fn import_one(&self, problem: &Problem) -> Result<ImportedData> {
        let url = self
            .problem_url(problem)
            .ok_or_else(|| AppError::content(problem.key().to_string(), "malformed problem id"))?;
        let html = fetch_text(&self.client, &url).await?;
        parse_statement(&html, &url)
    }

    fn problem_url(&self, problem: &Problem) -> Option<String> {
        let (contest, index) = split_id(&problem.id)?;
        self.url(&format!("/problemset/problem/{contest}/{index}")).ok()
    }
}

/// Split "1520E1" into ("1520", "E1").
fn split_id(id: &str) -> Option<(&str, &str)> {
    let at = id.find(|c: char| !c.is_ascii_digit())?;
    let (contest, index) = id.split_at(at);
    (!contest.is_empty()).then_some((contest, index))
}

/// Extract a Codeforces statement (`div.problemindexholder`) with its limits
/// and file names. Shared with the gym adapter.
pub(crate) fn parse_statement(html: &str, context: &str) -> Result<ImportedData> {
    if html.contains(LIMITED_LANG_PATTERN) {
        return Err(AppError::content(context, "problem doesn't support any language"));
    }
    let document = Html::parse_document(&escape_stray_lt(html));
    let content = document
        .select(&selector("div.problemindexholder")?)
        .next()
        .ok_or_else(|| AppError::content(context, "statement not found"))?;

    let mut data = ImportedData::default();
    data.input_file = property(&content, ".input-file")?.filter(|v| !v.contains("standard"));
    data.output_file = property(&content, ".output-file")?.filter(|v| !v.contains("standard"));
    data.timelimit = property(&content, ".time-limit")?.and_then(|v| parse_seconds(&v));
    data.memorylimit = property(&content, ".memory-limit")?.map(|v| normalize_memory(&v));

    let mut body = content.inner_html();
    for header in content.select(&selector(".header")?) {
        body = body.replace(&header.html(), "");
    }
    if body.trim().is_empty() {
        return Err(AppError::content(context, "empty statement"));
    }
    data.html = Some(format!("<div>\n{MATHJAX_HEADER}\n{body}\n</div>"));
    Ok(data)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::validation(format!("bad selector {css}: {e}")))
}

/// Text of a `.property-title`-prefixed property, without its title.
fn property(content: &ElementRef, css: &str) -> Result<Option<String>> {
    let Some(element) = content.select(&selector(css)?).next() else {
        return Ok(None);
    };
    let title: String = element
        .select(&selector(".property-title")?)
        .flat_map(|t| t.text())
        .collect();
    let text: String = element.text().collect();
    let value = text.strip_prefix(title.as_str()).unwrap_or(&text).trim().to_string();
    Ok((!value.is_empty()).then_some(value))
}

fn normalize_memory(text: &str) -> String {
    let units = [
        (r"\s*megabytes?", " MB"),
        (r"\s*kilobytes?", " KB"),
        (r"\s*gigabytes?", " GB"),
    ];
    units.iter().fold(text.to_string(), |acc, (pattern, unit)| {
        match Regex::new(pattern) {
            Ok(re) => re.replace(&acc, *unit).into_owned(),
            Err(_) => acc,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT: &str = r#"<html><body>
<div class="problemindexholder" problemindex="A">
  <div class="ttypography"><div class="problem-statement">
    <div class="header">
      <div class="title">A. Theatre Square</div>
      <div class="time-limit"><div class="property-title">time limit per test</div>1 second</div>
      <div class="memory-limit"><div class="property-title">memory limit per test</div>256 megabytes</div>
      <div class="input-file"><div class="property-title">input</div>standard input</div>
      <div class="output-file"><div class="property-title">output</div>output.txt</div>
    </div>
    <div><p>Theatre Square in the capital city of Berland has a rectangular shape.</p></div>
  </div></div>
</div>
</body></html>"#;

    #[test]
    fn test_parse_statement() {
        let data = parse_statement(STATEMENT, "cf/1A").unwrap();
        assert_eq!(data.timelimit, Some(1.0));
        assert_eq!(data.memorylimit.as_deref(), Some("256 MB"));
        assert_eq!(data.input_file, None);
        assert_eq!(data.output_file.as_deref(), Some("output.txt"));

        let html = data.html.unwrap();
        assert!(html.contains("Theatre Square in the capital"));
        assert!(!html.contains("time limit per test"));
        assert!(html.contains("MathJax"));
    }

    #[test]
    fn test_parse_statement_missing() {
        let err = parse_statement("<html><body><p>Nope</p></body></html>", "cf/1A").unwrap_err();
        assert!(matches!(err, AppError::ContentFormat { .. }));
    }

    #[test]
    fn test_limited_languages_rejected() {
        let html = format!("<div>The {LIMITED_LANG_PATTERN}: Kotlin</div>");
        assert!(parse_statement(&html, "cf/1A").is_err());
    }

    #[test]
    fn test_split_id() {
        assert_eq!(split_id("1A"), Some(("1", "A")));
        assert_eq!(split_id("1520E1"), Some(("1520", "E1")));
        assert_eq!(split_id("A1"), None);
        assert_eq!(split_id("1520"), None);
    }

    #[test]
    fn test_problem_url() {
        let adapter = CodeforcesAdapter::new(Client::new(), None).unwrap();
        let problem = Problem::new(SOURCE, "1520E1", "Permutation");
        assert_eq!(
            adapter.problem_url(&problem).as_deref(),
            Some("https://codeforces.com/problemset/problem/1520/E1")
        );
    }

    #[test]
    fn test_api_error_status() {
        let response: ApiResponse<Problemset> =
            serde_json::from_str(r#"{"status":"FAILED","comment":"Call limit exceeded"}"#).unwrap();
        assert!(response.into_result("api").is_err());
    }
}
