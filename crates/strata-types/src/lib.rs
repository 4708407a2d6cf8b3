//! Foundation types for Strata.
//!
//! This crate provides the addressing, identity, and configuration types used
//! throughout the Strata revision engine. Every other Strata crate depends on
//! `strata-types`.
//!
//! # Key Types
//!
//! - [`BranchPoint`] -- `(branch id, timestamp)` coordinate bounding revision visibility
//! - [`ObjectId`] -- Logical `(type, id)` identity of a versioned object
//! - [`TimestampSource`] -- Strictly monotonic millisecond clock for commit points
//! - [`StrataConfig`] -- Commit retry, merge, and compare settings

pub mod branch_point;
pub mod clock;
pub mod config;
pub mod error;
pub mod object;

pub use branch_point::{BranchId, BranchPoint, Timestamp, MAIN_BRANCH_ID, MAX_TIMESTAMP};
pub use clock::TimestampSource;
pub use config::{CommitConfig, CompareConfig, MergeConfig, StrataConfig};
pub use error::TypeError;
pub use object::ObjectId;
