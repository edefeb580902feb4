use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::app::model::ImportJob;
use crate::error::{CatalogError, Result};

/// In-process table of import jobs.
///
/// Each job's background task is the only writer of its record; readers get
/// clones, so a half-applied update is never visible.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, ImportJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: ImportJob) {
        self.jobs.write().await.insert(job.job_id.clone(), job);
    }

    pub async fn snapshot(&self, job_id: &str) -> Result<ImportJob> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| CatalogError::JobNotFound(job_id.to_string()))
    }

    /// Like [`snapshot`](Self::snapshot), but a job owned by someone else is
    /// reported as missing.
    pub async fn snapshot_for(&self, job_id: &str, owner: &str) -> Result<ImportJob> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .filter(|job| job.owner == owner)
            .cloned()
            .ok_or_else(|| CatalogError::JobNotFound(job_id.to_string()))
    }

    pub async fn contains(&self, job_id: &str) -> bool {
        self.jobs.read().await.contains_key(job_id)
    }

    /// Applies `f` under the write lock. Fails with `JobNotFound` once the
    /// job has been removed.
    pub async fn update<R>(&self, job_id: &str, f: impl FnOnce(&mut ImportJob) -> R) -> Result<R> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CatalogError::JobNotFound(job_id.to_string()))?;
        Ok(f(job))
    }

    /// Removes the job if `owner` owns it. Returns whether a record was
    /// removed.
    pub async fn remove(&self, job_id: &str, owner: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        if !jobs.get(job_id).is_some_and(|job| job.owner == owner) {
            return false;
        }
        jobs.remove(job_id).is_some()
    }

    /// Drops finished jobs whose completion is older than `ttl`. Running jobs
    /// are never evicted.
    pub async fn evict_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.completed_at {
            Some(done) if job.status.is_terminal() => now - done < ttl,
            _ => true,
        });
        before - jobs.len()
    }
}
