/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An optimistic-concurrency check failed at commit time.
    ///
    /// Another writer committed a change that overlaps with rows this writer
    /// read for update. The operation may be retried against a fresh snapshot.
    #[error("version conflict on {doc_type}: {detail}")]
    VersionConflict { doc_type: String, detail: String },

    /// The writer was already committed or discarded.
    #[error("writer is closed")]
    WriterClosed,

    /// A filter referenced a value the backend cannot evaluate.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding backend state was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    Poisoned,

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` for failures that may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
