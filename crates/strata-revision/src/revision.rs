//! Revision rows.
//!
//! A [`Revision`] is one immutable version of a logical object. Only its
//! `revised` set ever changes after it is written: every branch that
//! supersedes the revision appends its own branch point.

use serde_json::{Map, Value};
use strata_store::StoredDocument;
use strata_types::{BranchId, BranchPoint, ObjectId};
use uuid::Uuid;

use crate::error::{RevisionError, RevisionResult};

/// Row field holding the logical object id.
pub const FIELD_ID: &str = "id";
/// Row field holding the encoded `created` branch point.
pub const FIELD_CREATED: &str = "created";
/// Row field holding the encoded `revised` branch points.
pub const FIELD_REVISED: &str = "revised";
/// Row field holding the container object id as `type:id`.
pub const FIELD_CONTAINER: &str = "container";
/// Row field holding the property map.
pub const FIELD_PROPERTIES: &str = "properties";

/// One version of a logical object.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    /// Storage row id, unique per revision.
    pub row_id: String,
    /// Logical identity.
    pub object: ObjectId,
    /// Commit point that created this revision.
    pub created: BranchPoint,
    /// Points at which branches superseded this revision.
    pub revised: Vec<BranchPoint>,
    /// Container this revision is a component of.
    pub container: Option<ObjectId>,
    /// Trackable properties.
    pub properties: Map<String, Value>,
}

impl Revision {
    /// A fresh revision with a new time-ordered row id.
    pub fn new(
        object: ObjectId,
        created: BranchPoint,
        container: Option<ObjectId>,
        properties: Map<String, Value>,
    ) -> Self {
        Self {
            row_id: Uuid::now_v7().to_string(),
            object,
            created,
            revised: Vec::new(),
            container,
            properties,
        }
    }

    /// Upper visibility bound on `branch_id`: its own superseding point, or
    /// `(branch_id, MAX)` when the branch never superseded this revision.
    pub fn revised_on(&self, branch_id: BranchId) -> BranchPoint {
        self.revised
            .iter()
            .copied()
            .filter(|p| p.branch_id == branch_id)
            .min()
            .unwrap_or(BranchPoint::open(branch_id))
    }

    /// Encode as a storage row.
    pub fn to_document(&self) -> StoredDocument {
        let mut source = Map::new();
        source.insert(FIELD_ID.into(), Value::String(self.object.id().to_string()));
        source.insert(FIELD_CREATED.into(), Value::String(self.created.encode()));
        source.insert(
            FIELD_REVISED.into(),
            Value::Array(self.revised.iter().map(|p| Value::String(p.encode())).collect()),
        );
        if let Some(container) = &self.container {
            source.insert(FIELD_CONTAINER.into(), Value::String(container.to_string()));
        }
        source.insert(FIELD_PROPERTIES.into(), Value::Object(self.properties.clone()));
        StoredDocument::new(self.object.doc_type(), &self.row_id, source)
    }

    /// Decode a storage row.
    pub fn from_document(doc: &StoredDocument) -> RevisionResult<Self> {
        let id = text_field(doc, FIELD_ID)?;
        let created = decode_point(doc, text_field(doc, FIELD_CREATED)?)?;
        let revised = match doc.source.get(FIELD_REVISED) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v.as_str() {
                    Some(s) => decode_point(doc, s),
                    None => Err(corrupt(doc, "non-string revised point")),
                })
                .collect::<RevisionResult<_>>()?,
            Some(_) => return Err(corrupt(doc, "revised is not an array")),
        };
        let container = match doc.source.get(FIELD_CONTAINER).and_then(Value::as_str) {
            Some(s) => Some(ObjectId::parse(s).map_err(|e| corrupt(doc, e))?),
            None => None,
        };
        let properties = match doc.source.get(FIELD_PROPERTIES) {
            Some(Value::Object(map)) => map.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(_) => return Err(corrupt(doc, "properties is not an object")),
        };

        Ok(Self {
            row_id: doc.row_id.clone(),
            object: ObjectId::new(&doc.doc_type, id),
            created,
            revised,
            container,
            properties,
        })
    }
}

fn corrupt(doc: &StoredDocument, reason: impl std::fmt::Display) -> RevisionError {
    RevisionError::CorruptRevision {
        row_id: doc.row_id.clone(),
        reason: reason.to_string(),
    }
}

fn text_field<'a>(doc: &'a StoredDocument, field: &str) -> RevisionResult<&'a str> {
    doc.source
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| corrupt(doc, format!("missing string field {field}")))
}

fn decode_point(doc: &StoredDocument, s: &str) -> RevisionResult<BranchPoint> {
    BranchPoint::decode(s).map_err(|e| corrupt(doc, e))
}

/// The input to a write: an object's full new state.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub object: ObjectId,
    pub container: Option<ObjectId>,
    pub properties: Map<String, Value>,
}

impl Document {
    /// A document with no properties.
    pub fn new(doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object: ObjectId::new(doc_type, id),
            container: None,
            properties: Map::new(),
        }
    }

    /// Set one property.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Replace every property. Non-object values are ignored.
    pub fn with_properties(mut self, properties: Value) -> Self {
        if let Value::Object(map) = properties {
            self.properties = map;
        }
        self
    }

    /// Make this object a component of `container`.
    pub fn in_container(mut self, container: ObjectId) -> Self {
        self.container = Some(container);
        self
    }
}

impl From<&Revision> for Document {
    fn from(r: &Revision) -> Self {
        Self {
            object: r.object.clone(),
            container: r.container.clone(),
            properties: r.properties.clone(),
        }
    }
}
