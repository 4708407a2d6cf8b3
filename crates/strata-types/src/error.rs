use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch point encoding: {0}")]
    InvalidBranchPoint(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
