use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Logical identity of a versioned object: its document type plus its id.
///
/// An `ObjectId` is independent of storage row identity. Every revision of
/// the same logical object shares one `ObjectId`; the merge and diff
/// machinery keys its bookkeeping on it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    doc_type: String,
    id: String,
}

impl ObjectId {
    /// Create an object id from a document type name and an id.
    pub fn new(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }

    /// The document type name.
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// The id within the document type.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parse the `type:id` form produced by `Display`.
    ///
    /// Splits at the first `:` so ids may themselves contain colons.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        match s.split_once(':') {
            Some((doc_type, id)) if !doc_type.is_empty() && !id.is_empty() => {
                Ok(Self::new(doc_type, id))
            }
            _ => Err(TypeError::InvalidObjectId(s.to_string())),
        }
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doc_type, self.id)
    }
}
