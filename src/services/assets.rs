// src/services/assets.rs

//! Image asset rewriting.
//!
//! Images referenced by an imported statement are republished next to it so
//! the statement does not hotlink the judge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use regex::{Captures, Regex};
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::Problem;
use crate::services::queue::{TaskQueue, with_timeout};
use crate::storage::{AssetPublisher, PutOptions, keys};
use crate::utils::http::Fetcher;
use crate::utils::resolve;

/// Inline formula renderers some judges use; those stay hotlinked.
const FORMULA_PREFIX: &str = "formula?";

/// Republishes the images of imported HTML statements.
pub struct AssetRewriter {
    fetcher: Arc<dyn Fetcher>,
    publisher: Arc<dyn AssetPublisher>,
    queue: TaskQueue,
    timeout: Duration,
    url_extension: Regex,
    img_tag: Regex,
    src_attr: Regex,
}

impl AssetRewriter {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        publisher: Arc<dyn AssetPublisher>,
        queue: TaskQueue,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            fetcher,
            publisher,
            queue,
            timeout,
            url_extension: Regex::new(r"(?i)\.(png|bmp|jpeg|jpg|gif|tiff)$")?,
            img_tag: Regex::new(r"(?i)<img\b[^>]*>")?,
            src_attr: Regex::new(r#"(?i)(\ssrc\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)?,
        })
    }

    /// Publish every image of `html` and point its `src` at the published
    /// copy. `page_url` is the statement page relative sources resolve
    /// against.
    ///
    /// Images that cannot be republished keep their original `src`. The whole
    /// rewrite is bounded by the asset timeout.
    pub async fn rewrite(&self, problem: &Problem, html: &str, page_url: Option<&str>) -> Result<String> {
        let context = format!("images of {}", problem.key());
        with_timeout(&context, self.timeout, self.rewrite_all(problem, html, page_url)).await
    }

    async fn rewrite_all(&self, problem: &Problem, html: &str, page_url: Option<&str>) -> Result<String> {
        let sources = image_sources(html);
        if sources.is_empty() {
            return Ok(html.to_string());
        }

        let uploads = sources.iter().map(|src| async move {
            let published = self.queue.run(self.publish_image(problem, src, page_url)).await;
            (src, published)
        });

        let mut published_urls = HashMap::new();
        for (src, published) in join_all(uploads).await {
            match published {
                Ok(url) => {
                    published_urls.insert(src.as_str(), url);
                }
                Err(e) => log::warn!("Keeping image {} of {}: {}", src, problem.key(), e),
            }
        }
        Ok(self.replace_sources(html, &published_urls))
    }

    /// Point the `src` of every `<img>` found in `urls` at its published
    /// copy. Other attributes and text are left untouched.
    fn replace_sources(&self, html: &str, urls: &HashMap<&str, String>) -> String {
        self.img_tag
            .replace_all(html, |tag: &Captures| {
                self.src_attr
                    .replace(&tag[0], |attr: &Captures| {
                        let value = attr.get(2).or(attr.get(3)).or(attr.get(4)).map_or("", |m| m.as_str());
                        match urls.get(value.replace("&amp;", "&").trim()) {
                            Some(url) => format!("{}\"{}\"", &attr[1], url),
                            None => attr[0].to_string(),
                        }
                    })
                    .into_owned()
            })
            .into_owned()
    }

    async fn publish_image(&self, problem: &Problem, src: &str, page_url: Option<&str>) -> Result<String> {
        let uri = resolve(page_url, src)
            .ok_or_else(|| AppError::content(src, "cannot resolve image URL"))?;
        let resource = self.fetcher.fetch(&uri).await?;
        let ext = self
            .image_extension(resource.content_type.as_deref(), &uri)
            .ok_or_else(|| AppError::content(&uri, "not an image"))?;

        let key = keys::image(&problem.source, &problem.id, &uri, &ext);
        let options = PutOptions::immutable(resource.content_type.as_deref());
        let published = self.publisher.put(&key, resource.bytes, &options).await?;
        Ok(published.url)
    }

    /// File extension (with the dot) for a downloaded image.
    ///
    /// The content type decides; the URL suffix is the fallback. Generic
    /// binaries get no extension and text documents are rejected.
    fn image_extension(&self, content_type: Option<&str>, uri: &str) -> Option<String> {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let known = match mime.as_str() {
            "image/png" => Some("png"),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpeg"),
            "image/gif" => Some("gif"),
            "image/bmp" | "image/x-ms-bmp" => Some("bmp"),
            "image/tiff" => Some("tiff"),
            "image/svg+xml" => Some("svg"),
            "image/webp" => Some("webp"),
            "application/octet-stream" => return Some(String::new()),
            "text/html" | "text/plain" => return None,
            _ => None,
        };
        if let Some(ext) = known {
            return Some(format!(".{ext}"));
        }

        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        self.url_extension
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|ext| format!(".{}", ext.as_str().to_ascii_lowercase()))
    }
}

/// Distinct `<img src>` values of `html` worth republishing, in document
/// order.
pub fn image_sources(html: &str) -> Vec<String> {
    let document = Html::parse_fragment(html);
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };

    let mut sources: Vec<String> = Vec::new();
    for src in document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
    {
        if src.is_empty() || src.starts_with(FORMULA_PREFIX) {
            continue;
        }
        if !sources.iter().any(|s| s == src) {
            sources.push(src.to_string());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::storage::PublishedAsset;
    use crate::utils::http::FetchedResource;

    struct FakeFetcher {
        resources: HashMap<String, FetchedResource>,
        delay: Duration,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                resources: HashMap::new(),
                delay: Duration::ZERO,
            }
        }

        fn with(mut self, url: &str, content_type: Option<&str>) -> Self {
            self.resources.insert(
                url.to_string(),
                FetchedResource {
                    content_type: content_type.map(str::to_string),
                    bytes: vec![0x89, b'P', b'N', b'G'],
                },
            );
            self
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedResource> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.resources
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::fetch(url, "404 Not Found"))
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        puts: Mutex<Vec<(String, PutOptions)>>,
    }

    #[async_trait]
    impl AssetPublisher for RecordingPublisher {
        async fn put(&self, key: &str, _bytes: Vec<u8>, options: &PutOptions) -> Result<PublishedAsset> {
            self.puts.lock().unwrap().push((key.to_string(), options.clone()));
            Ok(PublishedAsset {
                key: key.to_string(),
                url: format!("https://cdn.example/{key}"),
            })
        }
    }

    fn rewriter(fetcher: FakeFetcher, publisher: Arc<RecordingPublisher>, timeout: Duration) -> AssetRewriter {
        AssetRewriter::new(Arc::new(fetcher), publisher, TaskQueue::new("assets", 30), timeout).unwrap()
    }

    #[test]
    fn test_image_sources_skip_formulas_and_empty() {
        let html = r#"<p><img src="a.png"><img src=""><img src="formula?x^2"><img src="a.png"><img src="/b.gif"></p>"#;
        assert_eq!(image_sources(html), vec!["a.png", "/b.gif"]);
    }

    #[test]
    fn test_replace_sources_handles_escaping() {
        let r = rewriter(FakeFetcher::new(), Arc::default(), Duration::from_secs(1));
        let urls = HashMap::from([("get.aspx?a=1&b=2", "https://cdn/1.png".to_string())]);
        let html = r#"<img src="get.aspx?a=1&amp;b=2"><img src='x.png'>"#;
        assert_eq!(
            r.replace_sources(html, &urls),
            r#"<img src="https://cdn/1.png"><img src='x.png'>"#
        );
    }

    #[test]
    fn test_replace_sources_only_touches_img_src() {
        let r = rewriter(FakeFetcher::new(), Arc::default(), Duration::from_secs(1));
        let urls = HashMap::from([("tree.png", "https://cdn/tree.png".to_string())]);
        let html = concat!(
            r#"<a href="tree.png">full size</a>"#,
            r#"<img alt="tree.png" data-src="tree.png" src='tree.png'>"#,
            r#"<IMG SRC=tree.png>"#,
            r#"<p>"tree.png"</p>"#,
        );
        assert_eq!(
            r.replace_sources(html, &urls),
            concat!(
                r#"<a href="tree.png">full size</a>"#,
                r#"<img alt="tree.png" data-src="tree.png" src="https://cdn/tree.png">"#,
                r#"<IMG SRC="https://cdn/tree.png">"#,
                r#"<p>"tree.png"</p>"#,
            )
        );
    }

    #[test]
    fn test_image_extension() {
        let r = rewriter(FakeFetcher::new(), Arc::default(), Duration::from_secs(1));
        assert_eq!(r.image_extension(Some("image/png"), "https://x/a"), Some(".png".into()));
        assert_eq!(r.image_extension(Some("image/jpeg; q=1"), "https://x/a"), Some(".jpeg".into()));
        assert_eq!(r.image_extension(Some("application/octet-stream"), "https://x/a.png"), Some(String::new()));
        assert_eq!(r.image_extension(Some("text/html"), "https://x/a.png"), None);
        assert_eq!(r.image_extension(None, "https://x/pic.JPG?v=2"), Some(".jpg".into()));
        assert_eq!(r.image_extension(Some("application/x-unknown"), "https://x/pic"), None);
    }

    #[tokio::test]
    async fn test_rewrite_publishes_and_keeps_failures() {
        let fetcher = FakeFetcher::new()
            .with("https://acm.timus.ru/image/get.aspx?id=1", Some("image/png"))
            .with("https://acm.timus.ru/page.html", Some("text/html"));
        let publisher = Arc::new(RecordingPublisher::default());
        let r = rewriter(fetcher, publisher.clone(), Duration::from_secs(120));

        let problem = Problem::new("timus", "1000", "A+B Problem");
        let html = r#"<img src="image/get.aspx?id=1"><img src="page.html"><img src="missing.png">"#;
        let out = r
            .rewrite(&problem, html, Some("https://acm.timus.ru/problem.aspx"))
            .await
            .unwrap();

        let puts = publisher.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        let (key, options) = &puts[0];
        assert!(key.starts_with("assets/images/timus/1000_"));
        assert!(key.ends_with(".png"));
        assert_eq!(options.cache_control, "max-age=31536000");
        assert!(options.public);

        assert!(out.contains(&format!("src=\"https://cdn.example/{key}\"")));
        assert!(out.contains(r#"src="page.html""#));
        assert!(out.contains(r#"src="missing.png""#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewrite_times_out() {
        let mut fetcher = FakeFetcher::new().with("https://x/a.png", Some("image/png"));
        fetcher.delay = Duration::from_secs(600);
        let r = rewriter(fetcher, Arc::default(), Duration::from_secs(120));

        let problem = Problem::new("codeforces", "1A", "Theatre Square");
        let result = r.rewrite(&problem, r#"<img src="a.png">"#, Some("https://x/")).await;
        assert!(matches!(result, Err(AppError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_rewrite_without_images_is_identity() {
        let r = rewriter(FakeFetcher::new(), Arc::default(), Duration::from_secs(1));
        let problem = Problem::new("codeforces", "1A", "Theatre Square");
        let html = "<p>No pictures</p>";
        assert_eq!(r.rewrite(&problem, html, None).await.unwrap(), html);
    }
}
