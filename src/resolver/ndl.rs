use std::sync::LazyLock;

use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use url::Url;

use super::{MetadataSource, SourceHit, SourceRole, endpoint};

pub const DEFAULT_BASE_URL: &str = "https://ndlsearch.ndl.go.jp/";

static JPEG_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link[^>]*type="image/jpeg"[^>]*href="([^"]+)""#).expect("jpeg link pattern")
});

/// National Diet Library OpenSearch; used for cover URLs only.
#[derive(Debug, Clone)]
pub struct NdlSource {
    client: reqwest::Client,
    base_url: Url,
}

impl NdlSource {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl MetadataSource for NdlSource {
    fn name(&self) -> &'static str {
        "ndl"
    }

    fn role(&self) -> SourceRole {
        SourceRole::CoverOnly
    }

    async fn lookup(&self, isbn: &str) -> anyhow::Result<Option<SourceHit>> {
        let mut url = endpoint(&self.base_url, "api/opensearch")?;
        url.query_pairs_mut()
            .append_pair("isbn", isbn)
            .append_pair("mediatype", "1")
            .append_pair("cnt", "1");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("request ndl opensearch")?;
        if !resp.status().is_success() {
            anyhow::bail!("ndl opensearch returned {}", resp.status());
        }
        let xml = resp.text().await.context("read ndl opensearch body")?;

        Ok(cover_link(&xml).map(|cover_url| SourceHit {
            cover_url: Some(cover_url),
            ..SourceHit::default()
        }))
    }
}

/// First JPEG `<link>` href in an OpenSearch RSS document.
pub fn cover_link(xml: &str) -> Option<String> {
    let href = JPEG_LINK.captures(xml)?.get(1)?.as_str();
    let href = href.replace("&amp;", "&");
    (!href.trim().is_empty()).then_some(href)
}
