use anyhow::Context as _;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use url::Url;

use super::{MetadataSource, SourceHit, SourceRole, endpoint, non_empty};

pub const DEFAULT_BASE_URL: &str = "https://api.openbd.jp/";

/// openBD (`/v1/get?isbn=...`), the primary bibliographic source.
#[derive(Debug, Clone)]
pub struct OpenBdSource {
    client: reqwest::Client,
    base_url: Url,
}

impl OpenBdSource {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl MetadataSource for OpenBdSource {
    fn name(&self) -> &'static str {
        "openbd"
    }

    fn role(&self) -> SourceRole {
        SourceRole::Bibliographic
    }

    async fn lookup(&self, isbn: &str) -> anyhow::Result<Option<SourceHit>> {
        let mut url = endpoint(&self.base_url, "v1/get")?;
        url.query_pairs_mut().append_pair("isbn", isbn);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("request openbd")?;
        if !resp.status().is_success() {
            anyhow::bail!("openbd returned {}", resp.status());
        }
        let body: Vec<Value> = resp.json().await.context("parse openbd json")?;

        Ok(body.first().and_then(parse_book))
    }
}

/// One element of the openBD response array; `null` means unknown ISBN.
pub fn parse_book(book: &Value) -> Option<SourceHit> {
    if book.is_null() {
        return None;
    }
    let summary = book.get("summary").unwrap_or(&Value::Null);
    let text = |pointer: &str| non_empty(summary.pointer(pointer).and_then(Value::as_str));

    let title = text("/title").or_else(|| {
        onix_text(
            book,
            &[
                "/onix/DescriptiveDetail/TitleDetail/TitleElement/TitleText/content",
                "/onix/DescriptiveDetail/TitleDetail/TitleElement/0/TitleText/content",
            ],
        )
    });
    let author = text("/author").or_else(|| {
        onix_text(
            book,
            &["/onix/DescriptiveDetail/Contributor/0/PersonName/content"],
        )
    });
    let publisher = text("/publisher").or_else(|| {
        onix_text(
            book,
            &[
                "/onix/PublishingDetail/Publisher/PublisherName",
                "/onix/PublishingDetail/Publisher/0/PublisherName",
            ],
        )
    });

    Some(SourceHit {
        title,
        author,
        publisher,
        series: text("/series"),
        cover_url: text("/cover"),
        release_date: text("/pubdate").as_deref().and_then(parse_pubdate),
    })
}

fn onix_text(book: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .find_map(|p| non_empty(book.pointer(p).and_then(Value::as_str)))
}

/// openBD dates come as `20180115`, `2018-01-15`, `201801` or `2018-01`.
pub fn parse_pubdate(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != raw.chars().filter(|c| *c != '-').count() {
        return None;
    }
    match digits.len() {
        8 => NaiveDate::parse_from_str(&digits, "%Y%m%d").ok(),
        6 => NaiveDate::parse_from_str(&format!("{digits}01"), "%Y%m%d").ok(),
        _ => None,
    }
}
