use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;

use crate::error::{CatalogError, Result};

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Downloads cover art. Failures, including bodies longer than
/// `max_bytes`, are reported as [`CatalogError::DownloadFailure`].
#[async_trait]
pub trait CoverFetcher: Send + Sync {
    async fn fetch(&self, url: &str, max_bytes: usize) -> Result<FetchedImage>;
}

#[derive(Debug, Clone)]
pub struct HttpCoverFetcher {
    client: reqwest::Client,
}

impl HttpCoverFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("build cover http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CoverFetcher for HttpCoverFetcher {
    async fn fetch(&self, url: &str, max_bytes: usize) -> Result<FetchedImage> {
        let failure = |err: reqwest::Error| CatalogError::DownloadFailure(format!("{url}: {err}"));
        let too_large = || {
            CatalogError::DownloadFailure(format!("{url}: body exceeds limit of {max_bytes} bytes"))
        };

        let mut resp = self.client.get(url).send().await.map_err(failure)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::DownloadFailure(format!(
                "{url}: status {status}"
            )));
        }
        if resp
            .content_length()
            .is_some_and(|len| len > max_bytes as u64)
        {
            return Err(too_large());
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(failure)? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// Turns an optional cover URL into an embedded image, never failing.
pub struct CoverMaterializer {
    fetcher: Arc<dyn CoverFetcher>,
    max_bytes: usize,
}

impl CoverMaterializer {
    pub fn new(fetcher: Arc<dyn CoverFetcher>, max_bytes: usize) -> Self {
        Self { fetcher, max_bytes }
    }

    pub async fn materialize(&self, url: Option<&str>, title: &str) -> String {
        let Some(url) = url else {
            return placeholder_cover(title);
        };

        match self.download(url).await {
            Ok(data_url) => data_url,
            Err(err) => {
                tracing::warn!(url, %err, "cover download failed; using placeholder");
                placeholder_cover(title)
            }
        }
    }

    async fn download(&self, url: &str) -> Result<String> {
        let image = self.fetcher.fetch(url, raw_limit(self.max_bytes)).await?;
        if image.bytes.is_empty() {
            return Err(CatalogError::DownloadFailure(format!("{url}: empty body")));
        }
        let encoded_len = encoded_len(image.bytes.len());
        if encoded_len > self.max_bytes {
            return Err(CatalogError::DownloadFailure(format!(
                "{url}: encoded image of {encoded_len} bytes exceeds limit of {}",
                self.max_bytes
            )));
        }
        let content_type = image.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        Ok(encode_data_url(content_type, &image.bytes))
    }
}

/// Base64 length of `n` raw bytes.
fn encoded_len(n: usize) -> usize {
    n.div_ceil(3) * 4
}

/// Largest raw body whose base64 form fits in `max_encoded` bytes.
fn raw_limit(max_encoded: usize) -> usize {
    max_encoded / 4 * 3
}

pub fn encode_data_url(content_type: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{content_type};base64,{encoded}")
}

/// Stable hue in `0..360` for a title.
pub fn title_hue(title: &str) -> u32 {
    let hash = title.encode_utf16().fold(0i32, |acc, unit| {
        i32::from(unit).wrapping_add(acc.wrapping_shl(5).wrapping_sub(acc))
    });
    (hash % 360).unsigned_abs()
}

/// SVG cover showing the first character of the title on a colour derived
/// from the title, as a `data:image/svg+xml` URL.
pub fn placeholder_cover(title: &str) -> String {
    let first = title
        .chars()
        .next()
        .map(|c| escape_xml(&c.to_string()))
        .unwrap_or_else(|| "?".to_string());
    let hue = title_hue(title);

    let svg = format!(
        r#"<svg width="200" height="300" xmlns="http://www.w3.org/2000/svg">
  <rect width="200" height="300" fill="hsl({hue}, 60%, 70%)"/>
  <text x="50%" y="50%" font-family="Arial, sans-serif" font-size="120" font-weight="bold" fill="hsl({hue}, 60%, 30%)" text-anchor="middle" dominant-baseline="middle">{first}</text>
  <text x="50%" y="85%" font-family="Arial, sans-serif" font-size="14" fill="hsl({hue}, 60%, 30%)" text-anchor="middle" opacity="0.7">No Image</text>
</svg>"#
    );
    encode_data_url("image/svg+xml", svg.as_bytes())
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
