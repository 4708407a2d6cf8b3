//! The [`BranchManager`] trait and the branch-change notification sink.

use strata_types::{BranchId, Timestamp};

use crate::error::Result;
use crate::types::{Branch, MergeSource};

/// Error type listeners may return. Failures are logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Sink notified once per successful commit on a branch.
pub trait BranchChangeListener: Send + Sync {
    /// Called after the branch at `path` moved to a new head.
    fn on_branch_changed(&self, path: &str) -> std::result::Result<(), ListenerError>;
}

/// Registry of branches and their heads.
///
/// Implementations must be thread-safe (`Send + Sync`). Heads and segments
/// only change through [`BranchManager::advance_head`] and
/// [`BranchManager::publish_reopen`]; both notify listeners exactly once.
pub trait BranchManager: Send + Sync {
    /// Create `name` under `parent_path`, based at the parent's current head.
    fn create_branch(&self, parent_path: &str, name: &str) -> Result<Branch>;

    /// Read a branch. Fails with `BranchNotFound`.
    fn get_branch(&self, path: &str) -> Result<Branch>;

    /// Every branch, ordered by path.
    fn branches(&self) -> Result<Vec<Branch>>;

    /// Move the head of `path` to `ts` after a commit written under
    /// `branch_id`, optionally recording a merge received in that commit.
    ///
    /// Fails with `HeadMoved` if the branch was reopened under another id.
    fn advance_head(
        &self,
        path: &str,
        branch_id: BranchId,
        ts: Timestamp,
        merge_source: Option<MergeSource>,
    ) -> Result<Branch>;

    /// Derive a detached copy of `path` re-based on its parent's current
    /// head under a fresh branch id. Nothing is published.
    fn prepare_reopen(&self, path: &str) -> Result<Branch>;

    /// Replace `expected` with `reopened` if the branch still has the id and
    /// head recorded in `expected`.
    fn publish_reopen(&self, expected: &Branch, reopened: Branch) -> Result<Branch>;

    /// Register a listener for every branch.
    fn add_change_listener(&self, listener: std::sync::Arc<dyn BranchChangeListener>) -> Result<()>;

    /// Head timestamp of `path`.
    fn head_timestamp(&self, path: &str) -> Result<Timestamp> {
        Ok(self.get_branch(path)?.head_timestamp)
    }

    /// Direct children of `path`, ordered by path.
    fn children(&self, path: &str) -> Result<Vec<Branch>> {
        self.get_branch(path)?;
        Ok(self
            .branches()?
            .into_iter()
            .filter(|b| b.parent_path.as_deref() == Some(path))
            .collect())
    }
}
