//! Commit records and commit results.

use serde::{Deserialize, Serialize};
use strata_branch::{Branch, MergeSource};
use strata_store::StoredDocument;
use strata_types::{BranchId, BranchPoint, Timestamp};
use uuid::Uuid;

use crate::error::RevisionResult;

/// Storage document type of commit records. Reserved.
pub const COMMIT_TYPE: &str = "commit";

/// One logical commit, stored as a document of type [`COMMIT_TYPE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub branch_path: String,
    pub branch_id: BranchId,
    pub timestamp: Timestamp,
    pub author: String,
    pub comment: String,
    /// Objects that did not exist on the branch before.
    pub added: usize,
    /// Objects that got a new revision.
    pub changed: usize,
    /// Objects that were removed.
    pub removed: usize,
    /// Set on merge commits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_source: Option<MergeSource>,
}

impl Commit {
    /// The commit point.
    pub fn point(&self) -> BranchPoint {
        BranchPoint::new(self.branch_id, self.timestamp)
    }

    /// Total number of changed objects.
    pub fn total_changes(&self) -> usize {
        self.added + self.changed + self.removed
    }

    pub(crate) fn to_document(&self) -> RevisionResult<StoredDocument> {
        Ok(StoredDocument::from_serializable(COMMIT_TYPE, Uuid::now_v7().to_string(), self)?)
    }

    pub(crate) fn from_document(doc: &StoredDocument) -> RevisionResult<Self> {
        Ok(doc.to_deserialized()?)
    }
}

/// Outcome of committing a staging area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitResult {
    /// The branch after the commit. Unchanged for an empty commit.
    pub branch: Branch,
    /// Logical commits written, oldest first. Empty for a no-op commit.
    pub commits: Vec<Commit>,
}

impl CommitResult {
    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Head timestamp after the commit.
    pub fn head_timestamp(&self) -> Timestamp {
        self.branch.head_timestamp
    }

    /// Objects added across all logical commits.
    pub fn added(&self) -> usize {
        self.commits.iter().map(|c| c.added).sum()
    }

    /// Objects changed across all logical commits.
    pub fn changed(&self) -> usize {
        self.commits.iter().map(|c| c.changed).sum()
    }

    /// Objects removed across all logical commits.
    pub fn removed(&self) -> usize {
        self.commits.iter().map(|c| c.removed).sum()
    }
}
