// src/sources/timus.rs

//! Timus Online Judge adapter.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use super::{SourceAdapter, escape_stray_lt};
use crate::error::{AppError, Result};
use crate::models::{ImportedData, Problem, ProblemListing};
use crate::utils::http::fetch_text;
use crate::utils::normalize_whitespace;

const SOURCE: &str = "timus";
const DEFAULT_BASE_URL: &str = "https://acm.timus.ru";
const PROBLEMS_PATH: &str = "/problemset.aspx?space=1&page=all";

/// Adapter for acm.timus.ru.
pub struct TimusAdapter {
    client: Client,
    base_url: Url,
}

impl TimusAdapter {
    pub fn new(client: Client, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?,
        })
    }
}

#[async_trait]
impl SourceAdapter for TimusAdapter {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn list_problems(&self) -> Result<Vec<ProblemListing>> {
        let url = self.base_url.join(PROBLEMS_PATH)?.to_string();
        let html = fetch_text(&self.client, &url).await?;
        parse_listing(&html)
    }

    async fn import_one(&self, problem: &Problem) -> Result<ImportedData> {
        let url = self
            .problem_url(problem)
            .ok_or_else(|| AppError::content(problem.key().to_string(), "bad problem url"))?;
        let html = fetch_text(&self.client, &url).await?;
        parse_statement(&html, &url)
    }

    fn problem_url(&self, problem: &Problem) -> Option<String> {
        let mut url = self.base_url.join("/problem.aspx").ok()?;
        url.query_pairs_mut()
            .append_pair("space", "1")
            .append_pair("num", &problem.id);
        Some(url.to_string())
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::validation(format!("bad selector {css}: {e}")))
}

/// Problem rows follow the `tr.content` header row; the second cell holds
/// the id and the third the name.
fn parse_listing(html: &str) -> Result<Vec<ProblemListing>> {
    let document = Html::parse_document(html);
    let rows = selector("tr.content ~ tr")?;
    let cells = selector("td")?;

    Ok(document
        .select(&rows)
        .filter_map(|row| {
            let cells: Vec<String> = row
                .select(&cells)
                .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
                .collect();
            let id = cells.get(1)?;
            let name = cells.get(2)?;
            (!id.is_empty() && !name.is_empty())
                .then(|| ProblemListing::new(SOURCE, id.as_str(), name.as_str()))
        })
        .collect())
}

fn parse_statement(html: &str, context: &str) -> Result<ImportedData> {
    let document = Html::parse_document(&escape_stray_lt(html));
    let mut data = ImportedData::default();

    if let Some(limits) = document.select(&selector(".problem_limits")?).next() {
        let text = normalize_whitespace(&limits.text().collect::<Vec<_>>().join(" "));
        let time = Regex::new(r"(?i)time\s*limit:\s*([\d.,]+)\s*\w")?;
        let memory = Regex::new(r"(?i)memory\s*limit:\s*([\d\w ]+)")?;
        data.timelimit = time
            .captures(&text)
            .and_then(|caps| caps[1].replace(',', ".").parse().ok());
        data.memorylimit = memory.captures(&text).map(|caps| caps[1].trim().to_string());
    }

    if let Some(source) = document.select(&selector(".problem_source")?).next() {
        let label: String = source.select(&selector("b")?).flat_map(|b| b.text()).collect();
        let text: String = source.text().collect();
        let origin = normalize_whitespace(text.strip_prefix(label.as_str()).unwrap_or(&text));
        data.origin = (!origin.is_empty()).then_some(origin);
    }

    let statement = document
        .select(&selector("#problem_text")?)
        .next()
        .ok_or_else(|| AppError::content(context, "statement not found"))?;
    let mut body = statement.inner_html();
    for source in statement.select(&selector(".problem_source")?) {
        body = body.replace(&source.html(), "");
    }
    if body.trim().is_empty() {
        return Err(AppError::content(context, "empty statement"));
    }
    data.html = Some(format!("<div class=\"timus-problem\">{body}</div>"));
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let html = r#"<table class="problemset">
<tr class="content"><td></td><td>ID</td><td>Name</td></tr>
<tr class="content"><td></td><td>1000</td><td><a href="problem.aspx?space=1&amp;num=1000">A+B Problem</a></td></tr>
<tr class="content"><td></td><td>1001</td><td><a href="problem.aspx?space=1&amp;num=1001">Reverse Root</a></td></tr>
<tr class="content"><td></td><td></td><td></td></tr>
</table>"#;
        let listings = parse_listing(html).unwrap();
        let ids: Vec<&str> = listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["1000", "1001"]);
        assert_eq!(listings[1].name, "Reverse Root");
    }

    #[test]
    fn test_parse_statement() {
        let html = r#"<html><body>
<div class="problem_content">
<div class="problem_limits">Time limit: 1.0 second<br>Memory limit: 64 MB</div>
<div id="problem_text"><div class="problem_par">Calculate a + b, where 1 <= a, b <= 10.</div>
<div class="problem_source"><b>Problem Source: </b>USU Junior Contest 1999</div></div>
</div></body></html>"#;
        let data = parse_statement(html, "timus/1000").unwrap();
        assert_eq!(data.timelimit, Some(1.0));
        assert_eq!(data.memorylimit.as_deref(), Some("64 MB"));
        assert_eq!(data.origin.as_deref(), Some("USU Junior Contest 1999"));

        let body = data.html.unwrap();
        assert!(body.starts_with("<div class=\"timus-problem\">"));
        assert!(body.contains("&lt;= a"));
        assert!(!body.contains("Problem Source"));
    }

    #[test]
    fn test_problem_url() {
        let adapter = TimusAdapter::new(Client::new(), None).unwrap();
        let problem = Problem::new(SOURCE, "1000", "A+B Problem");
        assert_eq!(
            adapter.problem_url(&problem).as_deref(),
            Some("https://acm.timus.ru/problem.aspx?space=1&num=1000")
        );
    }
}
