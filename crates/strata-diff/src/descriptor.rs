//! Document types and their trackable property descriptors.
//!
//! Every versioned document belongs to a [`DocumentType`] that declares how
//! each of its properties is diffed and merged. Properties without a
//! descriptor use [`DiffStrategy::Scalar`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// How a property value is compared and merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffStrategy {
    /// Whole-value replacement.
    Scalar,
    /// Ordered list of primitives, merged by re-applying added/removed items.
    List,
    /// Unordered list of primitives without duplicates.
    Set,
    /// Ordered list of objects identified by the `key` field.
    KeyedList { key: String },
    /// List of objects identified by the `key` field, kept sorted by key.
    KeyedSet { key: String },
    /// Object merged per sub-property when both sides hold objects.
    Nested,
}

static SCALAR: DiffStrategy = DiffStrategy::Scalar;

/// A trackable property: its name and merge strategy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub strategy: DiffStrategy,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, strategy: DiffStrategy) -> Self {
        Self {
            name: name.into(),
            strategy,
        }
    }
}

/// A registered document type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    /// Type name, used as the storage document type of its revisions.
    pub name: String,
    /// Declared properties, in declaration order.
    pub properties: Vec<PropertyDescriptor>,
}

impl DocumentType {
    /// A type with no declared properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Declare a property.
    pub fn with_property(mut self, name: impl Into<String>, strategy: DiffStrategy) -> Self {
        self.properties.push(PropertyDescriptor::new(name, strategy));
        self
    }

    /// The strategy for `property`, `Scalar` when undeclared.
    pub fn strategy(&self, property: &str) -> &DiffStrategy {
        self.properties
            .iter()
            .find(|p| p.name == property)
            .map_or(&SCALAR, |p| &p.strategy)
    }

    /// Check the descriptors for duplicates and empty names or keys.
    pub fn validate(&self) -> DiffResult<()> {
        let invalid = |property: &str, reason: &str| DiffError::InvalidDescriptor {
            doc_type: self.name.clone(),
            property: property.to_string(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("", "type name must not be empty"));
        }
        let mut seen = BTreeSet::new();
        for p in &self.properties {
            if p.name.is_empty() {
                return Err(invalid(&p.name, "property name must not be empty"));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(invalid(&p.name, "declared twice"));
            }
            if let DiffStrategy::KeyedList { key } | DiffStrategy::KeyedSet { key } = &p.strategy {
                if key.is_empty() {
                    return Err(invalid(&p.name, "item key must not be empty"));
                }
            }
        }
        Ok(())
    }
}

/// Thread-safe registry of document types, resolved once at registration.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<BTreeMap<String, Arc<DocumentType>>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Fails if the name is taken or a descriptor is invalid.
    pub fn register(&self, doc_type: DocumentType) -> DiffResult<Arc<DocumentType>> {
        doc_type.validate()?;
        let mut types = self.types.write().map_err(|_| DiffError::Poisoned)?;
        if types.contains_key(&doc_type.name) {
            return Err(DiffError::DuplicateType(doc_type.name));
        }
        let doc_type = Arc::new(doc_type);
        types.insert(doc_type.name.clone(), Arc::clone(&doc_type));
        Ok(doc_type)
    }

    /// Look up a type. Fails with `UnknownType`.
    pub fn get(&self, name: &str) -> DiffResult<Arc<DocumentType>> {
        let types = self.types.read().map_err(|_| DiffError::Poisoned)?;
        types
            .get(name)
            .cloned()
            .ok_or_else(|| DiffError::UnknownType(name.to_string()))
    }

    /// Names of every registered type, sorted.
    pub fn names(&self) -> DiffResult<Vec<String>> {
        let types = self.types.read().map_err(|_| DiffError::Poisoned)?;
        Ok(types.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept() -> DocumentType {
        DocumentType::new("concept")
            .with_property("tags", DiffStrategy::Set)
            .with_property(
                "descriptions",
                DiffStrategy::KeyedList {
                    key: "id".into(),
                },
            )
    }

    #[test]
    fn undeclared_property_is_scalar() {
        let t = concept();
        assert_eq!(t.strategy("tags"), &DiffStrategy::Set);
        assert_eq!(t.strategy("active"), &DiffStrategy::Scalar);
    }

    #[test]
    fn register_and_get() {
        let registry = TypeRegistry::new();
        registry.register(concept()).unwrap();
        assert_eq!(registry.get("concept").unwrap().properties.len(), 2);
        assert_eq!(registry.names().unwrap(), vec!["concept"]);
    }

    #[test]
    fn unknown_and_duplicate_types() {
        let registry = TypeRegistry::new();
        assert!(matches!(registry.get("concept"), Err(DiffError::UnknownType(_))));
        registry.register(concept()).unwrap();
        assert!(matches!(
            registry.register(concept()),
            Err(DiffError::DuplicateType(_))
        ));
    }

    #[test]
    fn invalid_descriptors_rejected() {
        let twice = DocumentType::new("t")
            .with_property("a", DiffStrategy::Scalar)
            .with_property("a", DiffStrategy::List);
        assert!(twice.validate().is_err());

        let keyless = DocumentType::new("t").with_property("a", DiffStrategy::KeyedSet { key: String::new() });
        assert!(keyless.validate().is_err());

        assert!(DocumentType::new("").validate().is_err());
    }

    #[test]
    fn strategy_serializes_tagged() {
        let json = serde_json::to_value(DiffStrategy::KeyedList { key: "id".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "keyed_list", "key": "id"}));
    }
}
