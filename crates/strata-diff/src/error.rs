//! Error types for the diff crate.

/// Errors that can occur while registering or resolving document types.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// No document type is registered under this name.
    #[error("unknown document type: {0}")]
    UnknownType(String),

    /// A document type with this name is already registered.
    #[error("document type already registered: {0}")]
    DuplicateType(String),

    /// A property descriptor is malformed.
    #[error("invalid descriptor {doc_type}.{property}: {reason}")]
    InvalidDescriptor {
        doc_type: String,
        property: String,
        reason: String,
    },

    /// The type registry lock was poisoned.
    #[error("type registry lock poisoned")]
    Poisoned,
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
