use thiserror::Error;

/// Failures surfaced by the catalog pipeline.
///
/// Inside an import job every variant except `EmptyBatch`, `EntryNotFound`
/// and `JobNotFound` is captured per item and reported through the job's
/// error list.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid ISBN: {0:?}")]
    InvalidIdentifier(String),

    #[error("bibliographic record not found")]
    NotFound(String),

    #[error("already registered")]
    DuplicateEntry(String),

    #[error("cover download failed: {0}")]
    DownloadFailure(String),

    #[error("no valid ISBNs in batch")]
    EmptyBatch,

    #[error("not in catalog: {0}")]
    EntryNotFound(String),

    #[error("import job not found: {0}")]
    JobNotFound(String),

    #[error("bibliographic lookup failed for {isbn}: {source:#}")]
    Upstream {
        isbn: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CatalogError {
    /// Whether the caller supplied bad input, as opposed to a lookup or
    /// storage failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier(_) | Self::DuplicateEntry(_) | Self::EmptyBatch
        )
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_entry_reason_is_short() {
        let err = CatalogError::DuplicateEntry("9784063123458".to_string());
        assert_eq!(err.to_string(), "already registered");
        assert!(err.is_client_error());
    }

    #[test]
    fn upstream_error_includes_cause_chain() {
        let source = anyhow::anyhow!("connection refused").context("request openbd");
        let err = CatalogError::Upstream {
            isbn: "9784063123458".to_string(),
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains("9784063123458"));
        assert!(msg.contains("request openbd"));
        assert!(msg.contains("connection refused"));
        assert!(!err.is_client_error());
    }
}
