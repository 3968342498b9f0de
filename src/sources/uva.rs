// src/sources/uva.rs

//! UVa Online Judge adapter.
//!
//! Most UVa statements are HTML pages, but older volumes only serve a
//! single-problem PDF; their statement page is a tiny meta-refresh stub.
//! Such problems are imported with `is_pdf` and published from `pdf_url`.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use super::{SourceAdapter, escape_stray_lt};
use crate::error::{AppError, Result};
use crate::models::{ImportedData, Problem, ProblemListing};
use crate::utils::http::fetch_text;
use crate::utils::normalize_whitespace;

const SOURCE: &str = "uva";
const DEFAULT_BASE_URL: &str = "https://onlinejudge.org";
const METADATA_API: &str = "https://uhunt.onlinejudge.org/api/p/num/";
const CATEGORIES: [&str; 2] = [
    "/index.php?option=com_onlinejudge&Itemid=8&category=1",
    "/index.php?option=com_onlinejudge&Itemid=8&category=2",
];
/// Redirect stubs are at most this long.
const PDF_STUB_LEN: usize = 200;
const DEFAULT_TIMELIMIT_MS: u64 = 3000;

#[derive(Debug, Deserialize)]
struct ProblemMetadata {
    /// Run time limit in milliseconds
    #[serde(default)]
    rtl: Option<u64>,
}

/// Adapter for onlinejudge.org.
pub struct UvaAdapter {
    client: Client,
    base_url: Url,
}

impl UvaAdapter {
    pub fn new(client: Client, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?,
        })
    }

    async fn list_category(&self, path: &str) -> Result<Vec<ProblemListing>> {
        let url = self.base_url.join(path)?;
        let html = fetch_text(&self.client, url.as_str()).await?;
        let mut problems = Vec::new();
        for volume in parse_volume_links(&html)? {
            let volume_url = url.join(&volume)?;
            match fetch_text(&self.client, volume_url.as_str()).await {
                Ok(page) => problems.extend(parse_volume(&page)?),
                Err(e) => log::debug!("Skipping UVa volume {}: {}", volume_url, e),
            }
        }
        Ok(problems)
    }

    async fn metadata(&self, problem: &Problem) -> Result<ProblemMetadata> {
        let url = format!("{METADATA_API}{}", problem.id);
        let body = fetch_text(&self.client, &url).await?;
        serde_json::from_str(&body).map_err(|e| AppError::content(url, e))
    }

    async fn statement(&self, url: &str) -> Result<String> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(url, e))?
            .bytes()
            .await
            .map_err(|e| AppError::fetch(url, e))?;
        Ok(decode_latin1(&bytes))
    }

    fn external_path(&self, problem: &Problem, file: &str) -> Option<String> {
        let number: u64 = problem.id.parse().ok()?;
        self.base_url
            .join(&format!("/external/{}/{file}", number / 100))
            .ok()
            .map(|u| u.to_string())
    }
}

#[async_trait]
impl SourceAdapter for UvaAdapter {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn list_problems(&self) -> Result<Vec<ProblemListing>> {
        let mut problems = Vec::new();
        for category in CATEGORIES {
            problems.extend(self.list_category(category).await?);
        }
        Ok(problems)
    }

    async fn import_one(&self, problem: &Problem) -> Result<ImportedData> {
        let url = self
            .problem_url(problem)
            .ok_or_else(|| AppError::content(problem.key().to_string(), "malformed problem id"))?;
        let (metadata, html) = futures::try_join!(self.metadata(problem), self.statement(&url))?;
        let mut data = parse_statement(&html, &url)?;
        data.timelimit = Some(metadata.rtl.unwrap_or(DEFAULT_TIMELIMIT_MS) as f64 / 1000.0);
        Ok(data)
    }

    fn problem_url(&self, problem: &Problem) -> Option<String> {
        self.external_path(problem, &format!("{}.html", problem.id))
    }

    fn pdf_url(&self, problem: &Problem) -> Option<String> {
        self.external_path(problem, &format!("p{}.pdf", problem.id))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AppError::validation(format!("bad selector {css}: {e}")))
}

/// UVa pages are served as ISO-8859-1.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn is_pdf_stub(html: &str) -> bool {
    html.len() <= PDF_STUB_LEN && html.contains("HTTP-EQUIV")
}

fn parse_volume_links(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    Ok(document
        .select(&anchors)
        .filter(|a| a.text().collect::<String>().trim_start().starts_with("Volume "))
        .filter_map(|a| a.value().attr("href"))
        .map(|href| format!("/{}", href.trim_start_matches('/')))
        .collect())
}

/// Problem rows follow the section header; the third cell reads "100 - Name".
fn parse_volume(html: &str) -> Result<Vec<ProblemListing>> {
    let document = Html::parse_document(html);
    let rows = selector("tr.sectiontableheader ~ tr")?;
    let cells = selector("td")?;

    Ok(document
        .select(&rows)
        .filter_map(|row| {
            let text = normalize_whitespace(&row.select(&cells).nth(2)?.text().collect::<String>());
            let (id, name) = text.split_once('-')?;
            let (id, name) = (id.trim(), name.trim());
            (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && !name.is_empty())
                .then(|| ProblemListing::new(SOURCE, id, name))
        })
        .collect())
}

fn parse_statement(html: &str, context: &str) -> Result<ImportedData> {
    if is_pdf_stub(html) {
        return Ok(ImportedData {
            is_pdf: true,
            ..ImportedData::default()
        });
    }

    let wrapped = if html.contains("<body>") {
        escape_stray_lt(html)
    } else {
        format!("<body>{}</body>", escape_stray_lt(html))
    };
    let document = Html::parse_document(&wrapped);
    let body_el = document
        .select(&selector("body")?)
        .next()
        .ok_or_else(|| AppError::content(context, "statement not found"))?;

    let mut data = ImportedData::default();
    let mut body = body_el.inner_html();
    // Judge banner and repeated title.
    for css in ["table[bgcolor=\"#0060F0\"]", "h1"] {
        if let Some(el) = body_el.select(&selector(css)?).next() {
            body = body.replacen(&el.html(), "", 1);
        }
    }
    if let Some(address) = body_el.select(&selector("address")?).next() {
        let origin = normalize_whitespace(&address.text().collect::<Vec<_>>().join(" "));
        data.origin = (!origin.is_empty()).then_some(origin);
        body = body.replace(&address.html(), "");
    }

    if body.trim().is_empty() {
        return Err(AppError::content(context, "empty statement"));
    }
    data.html = Some(format!("<div class=\"problem-statement\">{body}</div>"));
    Ok(data)
}
