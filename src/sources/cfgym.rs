// src/sources/cfgym.rs

//! Codeforces Gym adapter.
//!
//! Many gym contests only publish their statements as one merged PDF in the
//! contest attachments. Such problems are listed with `is_pdf` and the PDF
//! URL as `original_url`, and the pipeline segments them.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use super::codeforces::parse_statement;
use super::{SourceAdapter, parse_seconds};
use crate::error::{AppError, Result};
use crate::models::{ImportedData, Problem, ProblemListing};
use crate::utils::http::fetch_text;
use crate::utils::normalize_whitespace;

const SOURCE: &str = "cfgym";
const DEFAULT_BASE_URL: &str = "https://codeforces.com";
const GYM_CONTESTS_API: &str = "/api/contest.list?gym=true";
const CONTEST_PAGE_CONCURRENCY: usize = 10;

#[derive(Debug, Deserialize)]
struct ContestList {
    status: String,
    #[serde(default)]
    result: Vec<Contest>,
}

#[derive(Debug, Clone, Deserialize)]
struct Contest {
    id: u64,
    name: String,
    phase: String,
}

/// Adapter for Codeforces Gym contests.
pub struct CodeforcesGymAdapter {
    client: Client,
    base_url: Url,
}

impl CodeforcesGymAdapter {
    pub fn new(client: Client, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?,
        })
    }

    /// Problems of one contest; a contest that cannot be read lists nothing.
    async fn contest_problems(&self, contest: &Contest) -> Vec<ProblemListing> {
        match self.try_contest_problems(contest).await {
            Ok(problems) => problems,
            Err(e) => {
                log::debug!("Skipping gym contest {}: {}", contest.id, e);
                Vec::new()
            }
        }
    }

    async fn try_contest_problems(&self, contest: &Contest) -> Result<Vec<ProblemListing>> {
        let page_url = self.base_url.join(&format!("/gym/{}", contest.id))?;
        let html = fetch_text(&self.client, page_url.as_str()).await?;
        let (mut problems, first_link) = parse_contest_page(&html, contest)?;
        let Some(first_link) = first_link else {
            return Ok(Vec::new());
        };

        // A problem link redirecting to the attachments page means the
        // statements only exist as a PDF.
        let link = page_url.join(&first_link)?;
        let response = self
            .client
            .get(link.as_str())
            .send()
            .await
            .map_err(|e| AppError::fetch(link.as_str(), e))?;
        if !response.url().path().ends_with("/attachments") {
            return Ok(problems);
        }
        let final_url = response.url().clone();
        let attachments = response
            .text()
            .await
            .map_err(|e| AppError::fetch(final_url.as_str(), e))?;
        let pdf = find_statement_pdf(&attachments)
            .ok_or_else(|| AppError::content(final_url.as_str(), "no PDF statement"))?;
        let pdf_url = self.base_url.join(&pdf)?.to_string();

        for problem in &mut problems {
            problem.is_pdf = true;
            problem.original_url = Some(pdf_url.clone());
        }
        Ok(problems)
    }
}

#[async_trait]
impl SourceAdapter for CodeforcesGymAdapter {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn list_problems(&self) -> Result<Vec<ProblemListing>> {
        let url = self.base_url.join(GYM_CONTESTS_API)?.to_string();
        let body = fetch_text(&self.client, &url).await?;
        let list: ContestList = serde_json::from_str(&body).map_err(|e| AppError::content(&url, e))?;
        if list.status != "OK" {
            return Err(AppError::content(&url, format!("API status {}", list.status)));
        }

        let finished: Vec<Contest> = list
            .result
            .into_iter()
            .filter(|c| c.phase == "FINISHED")
            .collect();
        log::debug!("Reading {} finished gym contests", finished.len());

        let per_contest: Vec<Vec<ProblemListing>> = stream::iter(finished)
            .map(|contest| async move { self.contest_problems(&contest).await })
            .buffer_unordered(CONTEST_PAGE_CONCURRENCY)
            .collect()
            .await;
        Ok(per_contest.into_iter().flatten().collect())
    }

    async fn import_one(&self, problem: &Problem) -> Result<ImportedData> {
        if problem.is_pdf {
            let original_url = problem.original_url.clone().ok_or_else(|| {
                AppError::content(problem.key().to_string(), "PDF problem without originalUrl")
            })?;
            return Ok(ImportedData::merged_pdf(original_url));
        }
        let url = self
            .problem_url(problem)
            .ok_or_else(|| AppError::content(problem.key().to_string(), "malformed problem id"))?;
        let html = fetch_text(&self.client, &url).await?;
        parse_statement(&html, &url)
    }

    fn problem_url(&self, problem: &Problem) -> Option<String> {
        let (contest, index) = problem.id.split_once('/')?;
        self.base_url
            .join(&format!("/gym/{contest}/problem/{index}"))
            .ok()
            .map(|u| u.to_string())
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::validation(format!("bad selector {css}: {e}")))
}

/// Problems of a gym contest page, plus the first problem link.
fn parse_contest_page(html: &str, contest: &Contest) -> Result<(Vec<ProblemListing>, Option<String>)> {
    let document = Html::parse_document(html);
    let rows = selector("table.problems tr")?;
    let cells = selector("td")?;
    let link_selector = selector(&format!("a[href*=\"/{}/problem/\"]", contest.id))?;
    let notice = selector(".notice")?;
    let io_selector = selector("div")?;
    let limits = Regex::new(r"([.,\d]+)[^\d]*(\d+)")?;

    let mut problems = Vec::new();
    let mut first_link = None;
    for row in document.select(&rows) {
        let cells: Vec<_> = row.select(&cells).collect();
        let (Some(index_cell), Some(problem_cell)) = (cells.first(), cells.get(1)) else {
            continue;
        };
        let index = normalize_whitespace(&index_cell.text().collect::<String>());
        let Some(link) = problem_cell.select(&link_selector).next() else {
            continue;
        };
        if first_link.is_none() {
            first_link = link.value().attr("href").map(str::to_string);
        }

        let name = normalize_whitespace(&link.text().collect::<String>());
        let mut listing = ProblemListing::new(SOURCE, format!("{}/{}", contest.id, index), name);
        listing.origin = Some(contest.name.clone());

        if let Some(meta) = problem_cell.select(&notice).next() {
            let io = meta
                .select(&io_selector)
                .next()
                .map(|div| normalize_whitespace(&div.text().collect::<String>()))
                .unwrap_or_default();
            let all: String = meta.text().collect();
            let after_io = all.trim().strip_prefix(io.as_str()).unwrap_or(&all);
            if let Some(caps) = limits.captures(after_io) {
                listing.timelimit = parse_seconds(&caps[1]);
                listing.memorylimit = Some(format!("{} MB", &caps[2]));
            }
        }
        problems.push(listing);
    }
    Ok((problems, first_link))
}

/// Link of the English (else Portuguese) PDF in an attachments table.
fn find_statement_pdf(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let rows = Selector::parse("tr").ok()?;
    let cells = Selector::parse("td").ok()?;
    let anchor = Selector::parse("a[href]").ok()?;

    let find = |language: &str| {
        document.select(&rows).find_map(|row| {
            let cells: Vec<_> = row.select(&cells).collect();
            let position = cells
                .iter()
                .position(|cell| cell.text().collect::<String>().contains(language))?;
            let href = cells
                .get(position + 1)?
                .select(&anchor)
                .next()?
                .value()
                .attr("href")?
                .trim()
                .to_string();
            href.ends_with(".pdf").then_some(href)
        })
    };
    find("English").or_else(|| find("Portuguese"))
}
