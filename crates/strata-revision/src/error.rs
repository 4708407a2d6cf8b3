//! Error types for the revision crate.

use strata_branch::BranchError;
use strata_diff::DiffError;
use strata_store::StoreError;
use strata_types::{ObjectId, Timestamp};

/// Errors that can occur while reading or writing revisions.
#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    /// The same object was staged twice in one logical commit.
    #[error("duplicate revision for {0} in the same commit")]
    DuplicateRevision(ObjectId),

    /// The commit could not be written.
    #[error("commit on {branch} failed after {attempts} attempt(s): {reason}")]
    CommitFailed {
        branch: String,
        attempts: u32,
        reason: String,
    },

    /// The branch moved after the staged changes were computed.
    #[error("head of {branch} moved from {expected} to {actual}")]
    StaleHead {
        branch: String,
        expected: Timestamp,
        actual: Timestamp,
    },

    /// No document type is registered under this name.
    #[error("unknown document type: {0}")]
    UnknownType(String),

    /// The type name is reserved for internal documents.
    #[error("document type name is reserved: {0}")]
    ReservedType(String),

    /// A `path@timestamp` reference could not be parsed.
    #[error("invalid branch reference: {0}")]
    InvalidBranchRef(String),

    /// A stored row does not decode as a revision.
    #[error("corrupt revision row {row_id}: {reason}")]
    CorruptRevision { row_id: String, reason: String },

    /// Branch operation failed.
    #[error("branch error: {0}")]
    Branch(#[from] BranchError),

    /// Storage operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Type registry operation failed.
    #[error("type registry error: {0}")]
    Types(DiffError),
}

impl From<DiffError> for RevisionError {
    fn from(e: DiffError) -> Self {
        match e {
            DiffError::UnknownType(name) => RevisionError::UnknownType(name),
            other => RevisionError::Types(other),
        }
    }
}

/// Convenience alias for revision results.
pub type RevisionResult<T> = Result<T, RevisionError>;
