//! High-level SDK for Strata.
//!
//! [`Strata`] wires a storage index, a branch manager, and a document type
//! registry together and exposes the whole engine through one value:
//! branching, isolated writes, point-in-time reads, branch compare, and
//! merge or rebase with conflict detection.
//!
//! ```
//! use strata_sdk::{Document, DocumentType, Strata, StrataConfig, MAIN};
//!
//! let strata = Strata::new(StrataConfig::default()).unwrap();
//! strata.register_type(DocumentType::new("concept")).unwrap();
//! let child = strata.create_branch(MAIN, "review").unwrap();
//!
//! let mut writer = strata.open_writer(&child).unwrap();
//! writer.put(Document::new("concept", "1").with("term", "heart")).unwrap();
//! writer.commit("alice", "add heart").unwrap();
//!
//! strata.prepare_merge(&child, MAIN).merge().unwrap();
//! let main = strata.open_searcher(MAIN).unwrap();
//! assert!(main.get(&strata_sdk::ObjectId::new("concept", "1")).unwrap().is_some());
//! ```

pub mod error;
pub mod strata;

#[cfg(test)]
mod scenarios;

pub use error::{SdkError, SdkResult};
pub use strata::Strata;

// Re-export key types
pub use strata_branch::{Branch, BranchChangeListener, ListenerError, MergeSource, MAIN};
pub use strata_diff::{DiffStrategy, DocumentType, RevisionPropertyDiff};
pub use strata_merge::{
    CompareOp, Conflict, ConflictProcessor, DefaultConflictProcessor, MergeRequest, RevisionCompare,
    RevisionCompareDetail, StrictConflictProcessor,
};
pub use strata_revision::{
    BranchRef, Commit, CommitResult, Document, Revision, RevisionSearcher, StagingArea,
};
pub use strata_store::Expression;
pub use strata_types::{BranchPoint, ObjectId, StrataConfig, Timestamp};
