//! Error types for the merge crate.

use std::time::Duration;

use strata_branch::BranchError;
use strata_revision::RevisionError;
use strata_store::StoreError;

use crate::conflict::Conflict;

/// Errors that can occur while merging, rebasing, or comparing branches.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Hard conflicts remain. Nothing was committed.
    #[error("merge has {} conflict(s): {}", .0.len(), summarize(.0))]
    BranchMergeConflict(Vec<Conflict>),

    /// The merge ran past its time budget. Nothing was committed.
    #[error("merge timed out after {elapsed:?} (limit {limit:?})")]
    MergeTimeout { elapsed: Duration, limit: Duration },

    /// A branch cannot be merged into itself.
    #[error("cannot merge {0} into itself")]
    SameBranch(String),

    /// Revision read or commit failed.
    #[error("revision error: {0}")]
    Revision(#[from] RevisionError),

    /// Branch operation failed.
    #[error("branch error: {0}")]
    Branch(#[from] BranchError),

    /// Storage operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl MergeError {
    /// The conflicts of a `BranchMergeConflict`, empty otherwise.
    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            MergeError::BranchMergeConflict(conflicts) => conflicts,
            _ => &[],
        }
    }
}

fn summarize(conflicts: &[Conflict]) -> String {
    const SHOWN: usize = 3;
    let mut parts: Vec<String> = conflicts.iter().take(SHOWN).map(ToString::to_string).collect();
    if conflicts.len() > SHOWN {
        parts.push(format!("and {} more", conflicts.len() - SHOWN));
    }
    parts.join("; ")
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
