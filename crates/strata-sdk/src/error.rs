use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Config(#[from] strata_types::TypeError),

    #[error("store error: {0}")]
    Store(#[from] strata_store::StoreError),

    #[error("branch error: {0}")]
    Branch(#[from] strata_branch::BranchError),

    #[error("type registry error: {0}")]
    Types(#[from] strata_diff::DiffError),

    #[error("revision error: {0}")]
    Revision(#[from] strata_revision::RevisionError),

    #[error("merge error: {0}")]
    Merge(#[from] strata_merge::MergeError),
}

impl SdkError {
    /// Conflicts reported by a blocked merge. Empty for every other error.
    pub fn conflicts(&self) -> &[strata_merge::Conflict] {
        match self {
            SdkError::Merge(e) => e.conflicts(),
            _ => &[],
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
