//! Merge engine for Strata.
//!
//! Computes where two branches diverged, classifies every object either side
//! touched since then with a three-way merge, and either commits the result
//! or reports every conflict at once.
//!
//! # Key Types
//!
//! - [`MergeRequest`] -- Merge or rebase builder; `merge()` commits
//! - [`CompareRequest`] / [`RevisionCompare`] -- Read-only branch comparison
//! - [`Conflict`] -- The closed set of hard merge conflicts
//! - [`ConflictProcessor`] -- Policy for change-versus-removal pairs

pub mod ancestor;
mod classify;
pub mod compare;
pub mod conflict;
mod divergence;
pub mod engine;
pub mod error;

pub use ancestor::common_ancestor;
pub use classify::CONTAINER_PROPERTY;
pub use compare::{CompareOp, CompareRequest, RevisionCompare, RevisionCompareDetail};
pub use conflict::{dedup_conflicts, Conflict, ConflictProcessor, DefaultConflictProcessor, StrictConflictProcessor};
pub use engine::{MergeKind, MergeRequest, DEFAULT_MERGE_AUTHOR};
pub use error::{MergeError, MergeResult};
