// Contract shared by the event and location record stores.
//
// Purpose
// - Records are independently keyed collections with an integer version per record.
// - Every write is a conditional update keyed by id and expected version, so two writers racing
//   on the same record produce exactly one success.
//
// Boundaries
// - No referential integrity between collections. Callers keep event to location references
//   consistent procedurally.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("version mismatch on {id}: expected {expected}, actual {actual}")]
    VersionMismatch {
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(record: T, version: u64) -> Self {
        Self { record, version }
    }
}
