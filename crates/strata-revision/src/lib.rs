//! Revision storage for Strata.
//!
//! Every version of every object is an immutable row. A row carries the
//! branch point that created it and the points at which branches superseded
//! it, so which revision a branch sees is a pure function of the branch's
//! segments (see [`filter`]).
//!
//! # Key Types
//!
//! - [`RevisionContext`] -- Storage, branches, types, and clock in one handle
//! - [`RevisionSearcher`] -- Branch-scoped, point-in-time reads
//! - [`StagingArea`] -- Buffered writes committed atomically with retry
//! - [`Revision`] / [`Document`] -- Stored versions and write inputs
//! - [`Commit`] / [`CommitResult`] -- Commit records

pub mod commit;
pub mod context;
pub mod error;
pub mod filter;
pub mod revision;
pub mod searcher;
pub mod staging;

#[cfg(test)]
mod fixtures;

pub use commit::{Commit, CommitResult, COMMIT_TYPE};
pub use context::RevisionContext;
pub use error::{RevisionError, RevisionResult};
pub use filter::{
    created_in, open_ended_segments, revised_in, touched_at, touched_in, visible, visible_open_ended, BranchRef,
    ResolvedRef, TIMESTAMP_SEPARATOR,
};
pub use revision::{
    Document, Revision, FIELD_CONTAINER, FIELD_CREATED, FIELD_ID, FIELD_PROPERTIES, FIELD_REVISED,
};
pub use searcher::RevisionSearcher;
pub use staging::StagingArea;
