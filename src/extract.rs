//! Plain-text extraction from local files and web pages, feeding ingestion.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::core::config::ProxySettings;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Text,
    Json,
    Html,
}

fn kind_for(path: &str) -> Result<SourceKind, ApiError> {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "md" | "markdown" | "csv" | "tsv" | "log" | "rst" | "" => Ok(SourceKind::Text),
        "json" | "jsonl" => Ok(SourceKind::Json),
        "html" | "htm" | "xhtml" => Ok(SourceKind::Html),
        other => Err(ApiError::InvalidArgument(format!(
            "unsupported file type: .{}",
            other
        ))),
    }
}

fn html_patterns() -> &'static [Regex; 4] {
    static RE: OnceLock<[Regex; 4]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
                .expect("static pattern"),
            Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|section|article)>")
                .expect("static pattern"),
            Regex::new(r"(?s)<[^>]+>").expect("static pattern"),
            Regex::new(r"\n\s*\n+").expect("static pattern"),
        ]
    })
}

/// Drops scripts and markup, keeping block boundaries as line breaks.
pub fn html_to_text(html: &str) -> String {
    let [scripts, blocks, tags, blank_lines] = html_patterns();
    let text = scripts.replace_all(html, "");
    let text = blocks.replace_all(&text, "\n");
    let text = tags.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = blank_lines.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[derive(Clone)]
pub struct TextExtractor {
    http: reqwest::Client,
}

impl TextExtractor {
    pub fn new(proxy: &ProxySettings) -> Result<Self, ApiError> {
        Ok(Self {
            http: proxy.http_client(Duration::from_secs(60))?,
        })
    }

    /// Text of a local file or an `http(s)` URL.
    pub async fn extract(&self, source: &str) -> Result<String, ApiError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ApiError::InvalidArgument("path is empty".to_string()));
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch(source).await;
        }

        let kind = kind_for(source)?;
        let raw = match tokio::fs::read(source).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::NotFound(format!("file {}", source)))
            }
            Err(err) => return Err(ApiError::internal(err)),
        };
        debug!("Extracting {} ({:?})", source, kind);

        Ok(match kind {
            SourceKind::Text => raw,
            SourceKind::Json => match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => serde_json::to_string_pretty(&value)?,
                Err(_) => raw,
            },
            SourceKind::Html => html_to_text(&raw),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("GET {} failed: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Upstream(format!("GET {} returned {}", url, status)));
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(true, |value| value.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Upstream(format!("reading {} failed: {}", url, e)))?;
        Ok(if is_html { html_to_text(&body) } else { body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn strips_markup_and_scripts() {
        let html = "<html><head><style>p{}</style><script>var x = 1;</script></head>\
<body><h1>Title</h1><p>One &amp; two</p><p>Three<br>four</p></body></html>";
        assert_eq!(html_to_text(html), "Title\nOne & two\nThree\nfour");
    }

    #[tokio::test]
    async fn reads_local_files_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = TextExtractor::new(&ProxySettings::default()).unwrap();

        let md = dir.path().join("notes.md");
        std::fs::write(&md, "# Notes\nalpha").unwrap();
        assert_eq!(
            extractor.extract(md.to_str().unwrap()).await.unwrap(),
            "# Notes\nalpha"
        );

        let page = dir.path().join("page.html");
        std::fs::write(&page, "<p>hello</p>").unwrap();
        assert_eq!(extractor.extract(page.to_str().unwrap()).await.unwrap(), "hello");

        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, "%PDF").unwrap();
        assert!(matches!(
            extractor.extract(pdf.to_str().unwrap()).await,
            Err(ApiError::InvalidArgument(_))
        ));

        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            extractor.extract(missing.to_str().unwrap()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fetches_and_strips_web_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<div>Remote <b>text</b></div>", "text/html"),
            )
            .mount(&server)
            .await;

        let extractor = TextExtractor::new(&ProxySettings::default()).unwrap();
        let text = extractor
            .extract(&format!("{}/doc", server.uri()))
            .await
            .unwrap();
        assert_eq!(text, "Remote text");
    }
}
