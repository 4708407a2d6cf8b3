use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// A stored row: type tag + row id + JSON source + backend sequence number.
///
/// `StoredDocument` is the unit of storage. The store interprets the source
/// only to evaluate filter expressions; row identity is `(doc_type, row_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Document type (index mapping) name.
    pub doc_type: String,
    /// Storage-level row identifier, unique within `doc_type`.
    pub row_id: String,
    /// Version assigned by the backend on every write; ignored on `put`.
    pub seq_no: u64,
    /// The document body.
    pub source: Map<String, Value>,
}

impl StoredDocument {
    /// Create a new document from a JSON object body.
    pub fn new(doc_type: impl Into<String>, row_id: impl Into<String>, source: Map<String, Value>) -> Self {
        Self {
            doc_type: doc_type.into(),
            row_id: row_id.into(),
            seq_no: 0,
            source,
        }
    }

    /// Serialize a value into a document. The value must serialize to a JSON object.
    pub fn from_serializable<T: Serialize>(
        doc_type: impl Into<String>,
        row_id: impl Into<String>,
        value: &T,
    ) -> StoreResult<Self> {
        match serde_json::to_value(value)? {
            Value::Object(source) => Ok(Self::new(doc_type, row_id, source)),
            other => Err(StoreError::Serialization(format!(
                "document body must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Deserialize the document body.
    pub fn to_deserialized<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.source.clone()))?)
    }

    /// Resolve a dotted field path into every value it reaches.
    ///
    /// Arrays are flattened at each step, so `revised` on a document whose
    /// `revised` field is `["a", "b"]` yields both strings.
    pub fn field_values(&self, path: &str) -> Vec<&Value> {
        resolve_path(&self.source, path)
    }
}

pub(crate) fn resolve_path<'a>(source: &'a Map<String, Value>, path: &str) -> Vec<&'a Value> {
    let mut parts = path.split('.');
    let Some(first) = parts.next() else {
        return Vec::new();
    };
    let mut current: Vec<&Value> = source.get(first).into_iter().collect();
    for part in parts {
        let mut next = Vec::new();
        for value in flatten(current) {
            if let Value::Object(map) = value {
                if let Some(v) = map.get(part) {
                    next.push(v);
                }
            }
        }
        current = next;
    }
    flatten(current)
}

fn flatten(values: Vec<&Value>) -> Vec<&Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
