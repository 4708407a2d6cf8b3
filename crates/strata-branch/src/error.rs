//! Error types for branch operations.

use strata_types::{BranchId, Timestamp};
use thiserror::Error;

/// Errors that can occur during branch operations.
#[derive(Debug, Error)]
pub enum BranchError {
    /// No branch exists at this path.
    #[error("branch not found: {path}")]
    BranchNotFound { path: String },

    /// A branch already exists at this path.
    #[error("branch already exists: {path}")]
    BranchAlreadyExists { path: String },

    /// The branch name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// The branch moved since it was read (concurrent commit or reopen).
    #[error("branch {path} moved: expected {expected_id}@{expected_head}, found {actual_id}@{actual_head}")]
    HeadMoved {
        path: String,
        expected_id: BranchId,
        expected_head: Timestamp,
        actual_id: BranchId,
        actual_head: Timestamp,
    },

    /// The root branch has no parent to be reopened on.
    #[error("cannot reopen root branch {path}")]
    CannotReopenRoot { path: String },

    /// The branch id space is exhausted.
    #[error("no branch ids left")]
    IdsExhausted,

    /// A lock guarding branch state was poisoned.
    #[error("branch state lock poisoned")]
    Poisoned,
}

/// Convenience type alias for branch operations.
pub type Result<T> = std::result::Result<T, BranchError>;
