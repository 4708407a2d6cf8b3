//! Branch management for Strata.
//!
//! Branches are cheap logical views over the shared document space. Each
//! branch is described by an ordered list of segments, time windows on
//! physical branch ids, so creating a branch is O(1) and never copies data.
//!
//! # Architecture
//!
//! - **MAIN** is the root. Every other branch has a parent and is created at
//!   the parent's current head.
//! - **Heads** only move through commits ([`BranchManager::advance_head`]).
//! - **Reopen** re-bases a branch on its parent's head under a fresh physical
//!   id. It is prepared detached and published with a compare-and-swap.
//! - **Listeners** are notified once per successful commit or reopen.
//!
//! # Modules
//!
//! - [`error`] -- Error types for branch operations
//! - [`types`] -- [`Branch`], [`Segment`], [`MergeSource`] and segment arithmetic
//! - [`traits`] -- The [`BranchManager`] trait and [`BranchChangeListener`] sink
//! - [`names`] -- Branch name and path validation
//! - [`memory`] -- In-memory [`InMemoryBranchManager`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{BranchError, Result};
pub use memory::InMemoryBranchManager;
pub use names::{validate_branch_name, validate_branch_path};
pub use traits::{BranchChangeListener, BranchManager, ListenerError};
pub use types::{
    child_path, common_prefix, covers, segments_beyond, truncate_segments, Branch, MergeSource, Segment, MAIN,
    PATH_SEPARATOR,
};
