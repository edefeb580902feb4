use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::app::model::{ImportJob, ImportOptions, StartedImport};
use crate::app::queue::InProcessQueue;
use crate::app::registry::JobRegistry;
use crate::app::runner::ImportRunner;
use crate::catalog::{CatalogEntry, CatalogStats, CatalogStore, EntryFilter, ReadStatus};
use crate::config::ImportConfig;
use crate::error::{CatalogError, Result};
use crate::resolver::{BookRecord, MetadataResolver, ResolveOptions};
use crate::series::SeriesGroup;

/// Entry point for everything the HTTP service and the CLI do with a catalog.
pub struct ImportService {
    registry: Arc<JobRegistry>,
    runner: Arc<ImportRunner>,
    queue: InProcessQueue,
    catalog: Arc<dyn CatalogStore>,
    resolver: Arc<MetadataResolver>,
    config: ImportConfig,
}

impl ImportService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        resolver: Arc<MetadataResolver>,
        config: ImportConfig,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let runner = Arc::new(ImportRunner::new(
            Arc::clone(&registry),
            Arc::clone(&catalog),
            Arc::clone(&resolver),
            config.inter_item_delay,
        ));
        Self {
            registry,
            runner,
            queue: InProcessQueue::new(config.max_concurrent_jobs),
            catalog,
            resolver,
            config,
        }
    }

    /// Extracts candidate ISBNs from `text` and starts a job for them.
    pub async fn start_import(
        &self,
        owner: &str,
        text: &str,
        options: ImportOptions,
    ) -> Result<StartedImport> {
        let identifiers = crate::batch::extract_isbns(text);
        self.start_job(owner, identifiers, options).await
    }

    pub async fn start_job(
        &self,
        owner: &str,
        identifiers: Vec<String>,
        options: ImportOptions,
    ) -> Result<StartedImport> {
        if identifiers.is_empty() {
            return Err(CatalogError::EmptyBatch);
        }

        let job = ImportJob::new(owner, identifiers.len(), self.config.max_error_details);
        let started = StartedImport {
            job_id: job.job_id.clone(),
            total: job.progress.total,
        };
        self.registry.insert(job).await;
        tracing::info!(job_id = %started.job_id, owner, total = started.total, "import job queued");

        let runner = Arc::clone(&self.runner);
        self.queue.spawn(runner.run_job(
            started.job_id.clone(),
            owner.to_string(),
            identifiers,
            options,
        ));
        Ok(started)
    }

    /// Snapshot of one of `owner`'s jobs. Jobs of other owners are reported
    /// as missing.
    pub async fn progress(&self, owner: &str, job_id: &str) -> Result<ImportJob> {
        self.registry.snapshot_for(job_id, owner).await
    }

    /// Forgets one of `owner`'s jobs. A job still running stops after its
    /// current item. Unknown jobs and jobs of other owners are left alone.
    pub async fn cleanup(&self, owner: &str, job_id: &str) {
        if self.registry.remove(job_id, owner).await {
            tracing::debug!(job_id, owner, "import job removed");
        }
    }

    /// Polls until the job reaches a terminal status, reporting each change
    /// in processed count to `on_progress`.
    pub async fn wait_for(
        &self,
        owner: &str,
        job_id: &str,
        poll_interval: Duration,
        mut on_progress: impl FnMut(&ImportJob),
    ) -> Result<ImportJob> {
        let mut last_processed = None;
        loop {
            let job = self.progress(owner, job_id).await?;
            if last_processed != Some(job.progress.processed) {
                last_processed = Some(job.progress.processed);
                on_progress(&job);
            }
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn register(
        &self,
        owner: &str,
        isbn: &str,
        options: ResolveOptions,
    ) -> Result<CatalogEntry> {
        let entry = self.runner.register(owner, isbn, options).await?;
        tracing::info!(isbn = %entry.isbn, owner, "book registered");
        Ok(entry)
    }

    pub async fn resolve(&self, isbn: &str, options: ResolveOptions) -> Result<BookRecord> {
        let isbn = crate::isbn::normalize(isbn)?;
        self.resolver.resolve(&isbn, options).await
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<CatalogEntry>> {
        self.catalog.list(owner).await
    }

    /// Newest-first listing narrowed by `filter`.
    pub async fn search(&self, owner: &str, filter: &EntryFilter) -> Result<Vec<CatalogEntry>> {
        let mut entries = self.catalog.list(owner).await?;
        entries.retain(|entry| filter.matches(entry));
        Ok(entries)
    }

    pub async fn get(&self, owner: &str, isbn: &str) -> Result<CatalogEntry> {
        let isbn = crate::isbn::normalize(isbn)?;
        self.catalog
            .get_by_isbn(&isbn, owner)
            .await?
            .ok_or(CatalogError::EntryNotFound(isbn))
    }

    pub async fn set_read_status(
        &self,
        owner: &str,
        isbn: &str,
        status: ReadStatus,
    ) -> Result<CatalogEntry> {
        let isbn = crate::isbn::normalize(isbn)?;
        let entry = self
            .catalog
            .set_read_status(&isbn, owner, status)
            .await?
            .ok_or_else(|| CatalogError::EntryNotFound(isbn.clone()))?;
        tracing::info!(isbn = %isbn, owner, ?status, "read status updated");
        Ok(entry)
    }

    /// Removes the entry so the ISBN can be registered again.
    pub async fn delete(&self, owner: &str, isbn: &str) -> Result<()> {
        let isbn = crate::isbn::normalize(isbn)?;
        if !self.catalog.delete(&isbn, owner).await? {
            return Err(CatalogError::EntryNotFound(isbn));
        }
        tracing::info!(isbn = %isbn, owner, "book removed");
        Ok(())
    }

    pub async fn series(&self, owner: &str) -> Result<Vec<SeriesGroup>> {
        let entries = self.catalog.list(owner).await?;
        Ok(crate::series::group_by_series(&entries))
    }

    pub async fn stats(&self, owner: &str) -> Result<CatalogStats> {
        let entries = self.catalog.list(owner).await?;
        Ok(CatalogStats::from_entries(&entries))
    }

    /// Periodically evicts finished jobs when a TTL is configured.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let ttl = self.config.job_ttl?;
        let registry = Arc::clone(&self.registry);
        let period = ttl.min(Duration::from_secs(60));
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = registry.evict_expired(Utc::now(), ttl).await;
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted finished import jobs");
                }
            }
        }))
    }
}
