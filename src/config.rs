use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::resolver::{ndl, openbd};

pub const DEFAULT_USER_AGENT: &str = concat!(
    "comicshelf/",
    env!("CARGO_PKG_VERSION"),
    " (ISBN catalog importer)"
);

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub openbd_url: Url,
    pub ndl_url: Url,
    pub source_timeout: Duration,
    pub cover_timeout: Duration,
    pub user_agent: String,
    pub max_cover_bytes: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            openbd_url: Url::parse(openbd::DEFAULT_BASE_URL).expect("valid openbd url"),
            ndl_url: Url::parse(ndl::DEFAULT_BASE_URL).expect("valid ndl url"),
            source_timeout: Duration::from_secs(10),
            cover_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_cover_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ResolverConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = var(&lookup, "COMICSHELF_OPENBD_URL") {
            config.openbd_url = parse_http_url(&raw).context("COMICSHELF_OPENBD_URL")?;
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_NDL_URL") {
            config.ndl_url = parse_http_url(&raw).context("COMICSHELF_NDL_URL")?;
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_SOURCE_TIMEOUT_SECS") {
            config.source_timeout = parse_secs(&raw).context("COMICSHELF_SOURCE_TIMEOUT_SECS")?;
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_COVER_TIMEOUT_SECS") {
            config.cover_timeout = parse_secs(&raw).context("COMICSHELF_COVER_TIMEOUT_SECS")?;
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_USER_AGENT") {
            config.user_agent = raw;
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_MAX_COVER_BYTES") {
            config.max_cover_bytes = raw
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .with_context(|| format!("COMICSHELF_MAX_COVER_BYTES={raw:?}: expected a positive integer"))?;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Pause after every item of a job.
    pub inter_item_delay: Duration,
    /// Failure details kept per job; counts are never capped.
    pub max_error_details: usize,
    /// Finished jobs older than this are evicted. `None` keeps them until
    /// cleaned up explicitly.
    pub job_ttl: Option<Duration>,
    /// `None` lets any number of jobs run at once.
    pub max_concurrent_jobs: Option<usize>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_millis(200),
            max_error_details: 500,
            job_ttl: None,
            max_concurrent_jobs: None,
        }
    }
}

impl ImportConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = var(&lookup, "COMICSHELF_IMPORT_DELAY_MS") {
            let ms = raw.parse::<u64>().with_context(|| {
                format!("COMICSHELF_IMPORT_DELAY_MS={raw:?}: expected milliseconds")
            })?;
            config.inter_item_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_MAX_ERROR_DETAILS") {
            config.max_error_details = raw.parse::<usize>().with_context(|| {
                format!("COMICSHELF_MAX_ERROR_DETAILS={raw:?}: expected an integer")
            })?;
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_JOB_TTL_SECS") {
            config.job_ttl = Some(parse_secs(&raw).context("COMICSHELF_JOB_TTL_SECS")?);
        }
        if let Some(raw) = var(&lookup, "COMICSHELF_MAX_CONCURRENT_JOBS") {
            let n = raw.parse::<usize>().with_context(|| {
                format!("COMICSHELF_MAX_CONCURRENT_JOBS={raw:?}: expected an integer")
            })?;
            config.max_concurrent_jobs = (n > 0).then_some(n);
        }
        Ok(config)
    }
}

fn var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid url: {raw:?}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http/https: {url}");
    }
    Ok(url)
}

fn parse_secs(raw: &str) -> anyhow::Result<Duration> {
    let secs = raw
        .parse::<u64>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| anyhow::anyhow!("expected a positive number of seconds, got {raw:?}"))?;
    Ok(Duration::from_secs(secs))
}
