use std::sync::Arc;
use std::time::Duration;

use crate::app::model::{ImportJob, ImportOptions};
use crate::app::registry::JobRegistry;
use crate::catalog::{CatalogEntry, CatalogStore, NewCatalogEntry};
use crate::error::{CatalogError, Result};
use crate::resolver::{MetadataResolver, ResolveOptions};

/// Executes import jobs and single registrations against the catalog.
pub struct ImportRunner {
    registry: Arc<JobRegistry>,
    catalog: Arc<dyn CatalogStore>,
    resolver: Arc<MetadataResolver>,
    inter_item_delay: Duration,
}

impl ImportRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        catalog: Arc<dyn CatalogStore>,
        resolver: Arc<MetadataResolver>,
        inter_item_delay: Duration,
    ) -> Self {
        Self {
            registry,
            catalog,
            resolver,
            inter_item_delay,
        }
    }

    /// Runs the job to the end. Per-item errors are recorded on the job; only
    /// a panic in the job loop marks it failed, keeping progress so far.
    pub async fn run_job(
        self: Arc<Self>,
        job_id: String,
        owner: String,
        identifiers: Vec<String>,
        options: ImportOptions,
    ) {
        let runner = Arc::clone(&self);
        let id = job_id.clone();
        let worker =
            tokio::spawn(async move { runner.try_run_job(&id, &owner, identifiers, options).await });

        let failure = match worker.await {
            Ok(()) => return,
            Err(join_err) if join_err.is_panic() => "job task panicked".to_string(),
            Err(join_err) => format!("job task aborted: {join_err}"),
        };
        tracing::error!(job_id = %job_id, error = %failure, "import job failed");
        self.mark_failed(&job_id).await;
    }

    async fn try_run_job(
        &self,
        job_id: &str,
        owner: &str,
        identifiers: Vec<String>,
        options: ImportOptions,
    ) {
        let resolve = ResolveOptions {
            download_cover: options.download_covers,
        };
        tracing::info!(job_id, total = identifiers.len(), "import job started");

        for raw in identifiers {
            if !self.registry.contains(job_id).await {
                tracing::info!(job_id, "import job cleaned up while running; stopping");
                return;
            }

            let outcome = self.register(owner, &raw, resolve).await;
            if let Err(err) = &outcome {
                tracing::debug!(job_id, isbn = %raw, %err, "import item failed");
            }

            let applied = self
                .registry
                .update(job_id, |job| match outcome {
                    Ok(_) => job.record_success(),
                    Err(err) => job.record_failure(raw, err.to_string()),
                })
                .await;
            if applied.is_err() {
                tracing::info!(job_id, "import job cleaned up while running; stopping");
                return;
            }

            tokio::time::sleep(self.inter_item_delay).await;
        }

        match self.registry.update(job_id, ImportJob::complete).await {
            Ok(()) => {
                if let Ok(job) = self.registry.snapshot(job_id).await {
                    tracing::info!(
                        job_id,
                        succeeded = job.progress.succeeded,
                        failed = job.progress.failed,
                        "import job completed"
                    );
                }
            }
            Err(_) => tracing::info!(job_id, "import job cleaned up before completion"),
        }
    }

    async fn mark_failed(&self, job_id: &str) {
        if self.registry.update(job_id, ImportJob::fail).await.is_err() {
            tracing::debug!(job_id, "failed job was already cleaned up");
        }
    }

    /// Normalizes `raw`, refuses ISBNs the owner already has, resolves the
    /// record and stores it.
    pub async fn register(
        &self,
        owner: &str,
        raw: &str,
        options: ResolveOptions,
    ) -> Result<CatalogEntry> {
        let isbn = crate::isbn::normalize(raw)?;
        if self.catalog.exists(&isbn, owner).await? {
            return Err(CatalogError::DuplicateEntry(isbn));
        }

        let record = self.resolver.resolve(&isbn, options).await?;
        let cover = record.cover();
        self.catalog
            .create(NewCatalogEntry {
                isbn: record.isbn,
                title: record.title,
                author: record.author,
                publisher: record.publisher,
                series: record.series,
                cover,
                read_status: Default::default(),
                owner: owner.to_string(),
            })
            .await
    }
}
