use std::sync::Arc;

use strata_branch::{Branch, BranchManager};
use strata_diff::TypeRegistry;
use strata_store::Index;
use strata_types::{CommitConfig, TimestampSource};

use crate::error::RevisionResult;
use crate::filter::BranchRef;
use crate::searcher::RevisionSearcher;
use crate::staging::StagingArea;

/// Shared collaborators of every read and write: storage, branches, types,
/// the commit clock, and the retry policy.
#[derive(Clone)]
pub struct RevisionContext {
    pub index: Arc<dyn Index>,
    pub branches: Arc<dyn BranchManager>,
    pub types: Arc<TypeRegistry>,
    pub clock: Arc<TimestampSource>,
    pub commit: CommitConfig,
}

impl RevisionContext {
    pub fn new(
        index: Arc<dyn Index>,
        branches: Arc<dyn BranchManager>,
        types: Arc<TypeRegistry>,
        commit: CommitConfig,
    ) -> Self {
        Self {
            index,
            branches,
            types,
            clock: Arc::new(TimestampSource::new()),
            commit,
        }
    }

    /// Open a staging area on the branch at `path`.
    pub fn open_writer(&self, path: &str) -> RevisionResult<StagingArea> {
        self.branches.get_branch(path)?;
        Ok(StagingArea::on_branch(self.clone(), path))
    }

    /// Open a staging area on a branch that is not published yet.
    ///
    /// The commit only updates the returned branch; the caller publishes it.
    pub fn open_detached(&self, branch: Branch) -> StagingArea {
        StagingArea::detached(self.clone(), branch)
    }

    /// Open a searcher on `branch_ref` over the latest committed state.
    pub fn open_searcher(&self, branch_ref: &BranchRef) -> RevisionResult<RevisionSearcher> {
        RevisionSearcher::open(self.index.as_ref(), self.branches.as_ref(), branch_ref)
    }
}

impl std::fmt::Debug for RevisionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionContext")
            .field("commit", &self.commit)
            .finish_non_exhaustive()
    }
}
