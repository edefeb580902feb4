//! Bibliographic lookup for a single ISBN.
//!
//! Sources are consulted in order. A bibliographic source may fill any field
//! that is still empty; a cover-only source may only supply a cover URL.
//! The chain stops once a bibliographic source has answered and a cover URL
//! is known.

pub mod cover;
pub mod ndl;
pub mod openbd;

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::Cover;
use crate::config::ResolverConfig;
use crate::error::{CatalogError, Result};

use self::cover::{CoverFetcher, CoverMaterializer, HttpCoverFetcher};
use self::ndl::NdlSource;
use self::openbd::OpenBdSource;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookRecord {
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    pub cover_url: Option<String>,
    /// `data:` URL, only filled when the cover was requested.
    pub cover_data: Option<String>,
    pub release_date: Option<NaiveDate>,
}

impl BookRecord {
    /// Cover to persist: the embedded image when one was materialized.
    pub fn cover(&self) -> Option<Cover> {
        match (&self.cover_data, &self.cover_url) {
            (Some(data), _) => Some(Cover::Embedded(data.clone())),
            (None, Some(url)) => Some(Cover::Remote(url.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Download the cover and embed it, falling back to a generated
    /// placeholder. Defaults to `false`.
    #[serde(default)]
    pub download_cover: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    Bibliographic,
    CoverOnly,
}

/// What one source knows about an ISBN. Empty fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceHit {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    pub cover_url: Option<String>,
    pub release_date: Option<NaiveDate>,
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn role(&self) -> SourceRole;
    /// `Ok(None)` when the source has no record for `isbn`.
    async fn lookup(&self, isbn: &str) -> anyhow::Result<Option<SourceHit>>;
}

/// State of the accumulated record after a chain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Full,
    Partial,
    Miss,
}

#[derive(Debug, Default)]
struct Draft {
    found: bool,
    hit: SourceHit,
}

impl Draft {
    fn merge(&mut self, role: SourceRole, hit: SourceHit) {
        let SourceHit {
            title,
            author,
            publisher,
            series,
            cover_url,
            release_date,
        } = hit;

        if role == SourceRole::Bibliographic {
            self.found = true;
            fill(&mut self.hit.title, title);
            fill(&mut self.hit.author, author);
            fill(&mut self.hit.publisher, publisher);
            fill(&mut self.hit.series, series);
            fill(&mut self.hit.release_date, release_date);
        }
        fill(&mut self.hit.cover_url, cover_url);
    }

    fn state(&self) -> Lookup {
        match (self.found, self.hit.cover_url.is_some()) {
            (true, true) => Lookup::Full,
            (false, false) => Lookup::Miss,
            _ => Lookup::Partial,
        }
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

pub fn unknown_title(isbn: &str) -> String {
    format!("Unknown title: {isbn}")
}

pub struct MetadataResolver {
    sources: Vec<Arc<dyn MetadataSource>>,
    covers: CoverMaterializer,
}

impl MetadataResolver {
    pub fn new(
        sources: Vec<Arc<dyn MetadataSource>>,
        fetcher: Arc<dyn CoverFetcher>,
        max_cover_bytes: usize,
    ) -> Self {
        Self {
            sources,
            covers: CoverMaterializer::new(fetcher, max_cover_bytes),
        }
    }

    /// openBD first, then NDL for covers.
    pub fn from_config(config: &ResolverConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.source_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("build metadata http client")?;
        let fetcher = HttpCoverFetcher::new(config.cover_timeout, &config.user_agent)
            .context("build cover http client")?;

        let sources: Vec<Arc<dyn MetadataSource>> = vec![
            Arc::new(OpenBdSource::new(client.clone(), config.openbd_url.clone())),
            Arc::new(NdlSource::new(client, config.ndl_url.clone())),
        ];
        Ok(Self::new(sources, Arc::new(fetcher), config.max_cover_bytes))
    }

    pub async fn resolve(&self, isbn: &str, options: ResolveOptions) -> Result<BookRecord> {
        let mut draft = Draft::default();
        let mut failure: Option<anyhow::Error> = None;

        for source in &self.sources {
            match source.lookup(isbn).await {
                Ok(Some(hit)) => draft.merge(source.role(), hit),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(isbn, source = source.name(), ?err, "metadata source failed");
                    if failure.is_none() {
                        failure = Some(err.context(format!("query {}", source.name())));
                    }
                }
            }

            let state = draft.state();
            tracing::debug!(isbn, source = source.name(), ?state, "metadata source consulted");
            if state == Lookup::Full {
                break;
            }
        }

        if !draft.found && draft.hit.cover_url.is_none() {
            return Err(match failure {
                Some(source) => CatalogError::Upstream {
                    isbn: isbn.to_string(),
                    source,
                },
                None => CatalogError::NotFound(isbn.to_string()),
            });
        }

        let SourceHit {
            title,
            author,
            publisher,
            series,
            cover_url,
            release_date,
        } = draft.hit;
        let title = title.unwrap_or_else(|| unknown_title(isbn));

        let cover_data = if options.download_cover {
            Some(self.covers.materialize(cover_url.as_deref(), &title).await)
        } else {
            None
        };

        Ok(BookRecord {
            isbn: isbn.to_string(),
            title,
            author,
            publisher,
            series,
            cover_url,
            cover_data,
            release_date,
        })
    }
}

/// `base` joined with `path`, treating `base` as a directory.
pub(crate) fn endpoint(base: &Url, path: &str) -> anyhow::Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path)
        .with_context(|| format!("join {path} onto {base}"))
}

/// Trimmed value, `None` when empty.
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
