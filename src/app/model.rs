use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportFailure {
    pub isbn: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<ImportFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub owner: String,
    pub status: JobStatus,
    pub progress: ImportProgress,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    max_error_details: usize,
}

impl ImportJob {
    pub fn new(owner: impl Into<String>, total: usize, max_error_details: usize) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            status: JobStatus::Processing,
            progress: ImportProgress {
                total,
                ..ImportProgress::default()
            },
            started_at: Utc::now(),
            completed_at: None,
            max_error_details,
        }
    }

    pub fn record_success(&mut self) {
        if !self.accepts_items() {
            return;
        }
        self.progress.processed += 1;
        self.progress.succeeded += 1;
    }

    /// Counts a failed item. The reason is kept only while the detail list
    /// is below its cap.
    pub fn record_failure(&mut self, isbn: impl Into<String>, reason: impl Into<String>) {
        if !self.accepts_items() {
            return;
        }
        self.progress.processed += 1;
        self.progress.failed += 1;
        if self.progress.errors.len() < self.max_error_details {
            self.progress.errors.push(ImportFailure {
                isbn: isbn.into(),
                reason: reason.into(),
            });
        }
    }

    pub fn complete(&mut self) {
        self.finish(JobStatus::Completed);
    }

    pub fn fail(&mut self) {
        self.finish(JobStatus::Failed);
    }

    fn finish(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    fn accepts_items(&self) -> bool {
        self.status == JobStatus::Processing && self.progress.processed < self.progress.total
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportOptions {
    /// Embed cover images in created entries. Defaults to `false`.
    #[serde(default)]
    pub download_covers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartedImport {
    pub job_id: String,
    pub total: usize,
}
