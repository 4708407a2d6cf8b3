//! Diff and three-way merge engine for Strata revisions.
//!
//! Document types declare how each property is compared; this crate turns a
//! pair of revisions into property diffs and an ancestor/source/target triple
//! into a merged property map plus property-level conflicts.
//!
//! # Key Types
//!
//! - [`DocumentType`] / [`PropertyDescriptor`] / [`DiffStrategy`] -- Per-type merge rules
//! - [`TypeRegistry`] -- Thread-safe registry of document types
//! - [`RevisionPropertyDiff`] -- One changed property between two revisions
//! - [`PropertyMerge`] / [`PropertyConflict`] -- Result of a three-way property merge

pub mod descriptor;
pub mod error;
pub mod property_diff;
pub mod three_way;

pub use descriptor::{DiffStrategy, DocumentType, PropertyDescriptor, TypeRegistry};
pub use error::{DiffError, DiffResult};
pub use property_diff::{diff_properties, same_properties, RevisionPropertyDiff};
pub use three_way::{merge_properties, PropertyConflict, PropertyMerge};
