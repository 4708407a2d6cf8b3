//! Storage contract for Strata.
//!
//! The revision engine is storage-agnostic: it talks to a document backend
//! only through the [`Index`], [`Searcher`] and [`Writer`] traits defined
//! here, and expresses every query in the [`Expression`] filter algebra.
//!
//! # Backends
//!
//! - [`MemoryIndex`] -- snapshot-swapping in-memory backend for tests and embedding
//!
//! # Contract
//!
//! 1. A searcher is a point-in-time view; it never sees later commits.
//! 2. A writer's operations are invisible to everyone else until `commit`.
//! 3. `commit` is all-or-nothing.
//! 4. A bulk update whose predicate matches a different row set at commit
//!    than when it was staged fails the commit with a version conflict.
//! 5. Version conflicts are transient ([`StoreError::is_transient`]); every
//!    other error is not.

pub mod document;
pub mod error;
pub mod filter;
pub mod memory;
pub mod traits;

pub use document::StoredDocument;
pub use error::{StoreError, StoreResult};
pub use filter::Expression;
pub use memory::{MemoryIndex, MemorySearcher, MemoryWriter};
pub use traits::{Hits, Index, Query, Searcher, Update, Writer};
