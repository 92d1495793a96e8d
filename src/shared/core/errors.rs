// Error taxonomy surfaced at every operation boundary.
//
// Validation and permission failures are detected before any mutation. Conflicts carry the
// current status when it is known so callers can refresh and retry.

use crate::shared::infrastructure::record_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Permission(String),

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        current_status: Option<String>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("external calendar error: {0}")]
    External(String),

    #[error("operation cancelled after {processed} of {total} items")]
    Cancelled { processed: usize, total: usize },

    #[error("storage error: {0}")]
    Store(String),
}

impl ApplicationError {
    pub fn conflict(message: impl Into<String>, current_status: Option<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            current_status,
        }
    }

    /// Short machine readable label used in per-item summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Permission(_) => "permission",
            Self::Conflict { .. } => "conflict",
            Self::NotFound(_) => "not_found",
            Self::External(_) => "external",
            Self::Cancelled { .. } => "cancelled",
            Self::Store(_) => "store",
        }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionMismatch { id, .. } => Self::Conflict {
                message: format!("{id} was modified concurrently"),
                current_status: None,
            },
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Duplicate(id) => Self::Conflict {
                message: format!("{id} already exists"),
                current_status: None,
            },
            StoreError::Backend(message) => Self::Store(message),
        }
    }
}

#[cfg(test)]
mod application_error_tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn it_should_map_a_version_mismatch_to_a_conflict() {
        let error: ApplicationError = StoreError::VersionMismatch {
            id: "ev-1".into(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert_eq!(error.kind(), "conflict");
        assert_eq!(error.to_string(), "conflict: ev-1 was modified concurrently");
    }

    #[rstest]
    fn it_should_keep_not_found_distinct_from_backend_failures() {
        let missing: ApplicationError = StoreError::NotFound("loc-9".into()).into();
        let offline: ApplicationError = StoreError::Backend("offline".into()).into();
        assert_eq!(missing, ApplicationError::NotFound("loc-9".into()));
        assert_eq!(offline, ApplicationError::Store("offline".into()));
    }
}
