//! Per-object three-way classification.
//!
//! | ancestor -> source | ancestor -> target | outcome |
//! |---|---|---|
//! | unchanged | any | target |
//! | any | unchanged | source |
//! | added | added, equal | target |
//! | added | added, different | `AddedInSourceAndTarget` |
//! | changed | removed | processor decides; default removed |
//! | removed | changed | processor decides; default removed |
//! | removed | removed | removed |
//! | changed | changed | property merge; overlapping changes conflict |
//!
//! A removal is additionally blocked when the other side changed a component
//! of the removed object.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use strata_diff::{diff_properties, merge_properties, same_properties, DocumentType, TypeRegistry};
use strata_revision::Document;
use strata_types::ObjectId;
use tracing::debug;

use crate::conflict::{dedup_conflicts, Conflict, ConflictProcessor};
use crate::divergence::States;

/// Property name conflicts on the container reference are reported under.
pub const CONTAINER_PROPERTY: &str = "container";

/// Returns `true` if both sides hold the same object state.
pub(crate) fn same_document(x: Option<&Document>, y: Option<&Document>) -> bool {
    match (x, y) {
        (None, None) => true,
        (Some(x), Some(y)) => x.container == y.container && same_properties(&x.properties, &y.properties),
        _ => false,
    }
}

/// Merge one object. `Ok(None)` means the object ends up absent.
pub(crate) fn resolve_object(
    object: &ObjectId,
    doc_type: Option<&DocumentType>,
    ancestor: Option<&Document>,
    source: Option<&Document>,
    target: Option<&Document>,
    processor: &dyn ConflictProcessor,
) -> Result<Option<Document>, Vec<Conflict>> {
    if same_document(source, ancestor) || same_document(source, target) {
        return Ok(target.cloned());
    }
    if same_document(target, ancestor) {
        return Ok(source.cloned());
    }
    match (ancestor, source, target) {
        (None, Some(_), Some(_)) => Err(vec![Conflict::AddedInSourceAndTarget { object: object.clone() }]),
        (Some(a), Some(s), None) => {
            match processor.changed_in_source_detached_in_target(object, diff_properties(&a.properties, &s.properties)) {
                Some(conflict) => Err(vec![conflict]),
                None => Ok(None),
            }
        }
        (Some(a), None, Some(t)) => {
            match processor.detached_in_source_changed_in_target(object, diff_properties(&a.properties, &t.properties)) {
                Some(conflict) => Err(vec![conflict]),
                None => Ok(None),
            }
        }
        (Some(a), Some(s), Some(t)) => merge_changed(object, doc_type, a, s, t),
        // Every remaining shape has one side equal to the ancestor.
        _ => Ok(target.cloned()),
    }
}

fn merge_changed(
    object: &ObjectId,
    doc_type: Option<&DocumentType>,
    a: &Document,
    s: &Document,
    t: &Document,
) -> Result<Option<Document>, Vec<Conflict>> {
    let merge = merge_properties(doc_type, &a.properties, &s.properties, &t.properties);
    let mut conflicts: Vec<Conflict> = merge
        .conflicts
        .into_iter()
        .map(|c| Conflict::ChangedInSourceAndTarget {
            object: object.clone(),
            property: c.path,
            source_value: c.source_value,
            target_value: c.target_value,
        })
        .collect();

    let container = if s.container == a.container || s.container == t.container {
        t.container.clone()
    } else if t.container == a.container {
        s.container.clone()
    } else {
        conflicts.push(Conflict::ChangedInSourceAndTarget {
            object: object.clone(),
            property: CONTAINER_PROPERTY.to_string(),
            source_value: container_value(&s.container),
            target_value: container_value(&t.container),
        });
        t.container.clone()
    };

    if !conflicts.is_empty() {
        return Err(conflicts);
    }
    Ok(Some(Document {
        object: object.clone(),
        container,
        properties: merge.merged,
    }))
}

fn container_value(container: &Option<ObjectId>) -> Value {
    container.as_ref().map_or(Value::Null, |c| Value::String(c.to_string()))
}

/// Result of classifying every touched object.
#[derive(Debug, Default)]
pub(crate) struct Classification {
    /// Final state of every object that merged cleanly.
    pub merged: BTreeMap<ObjectId, Option<Document>>,
    pub conflicts: Vec<Conflict>,
}

/// Classify `objects`, with `states` loaded for at least those objects.
pub(crate) fn classify(
    objects: &BTreeSet<ObjectId>,
    states: &States,
    types: &TypeRegistry,
    processor: &dyn ConflictProcessor,
) -> Classification {
    let mut out = Classification::default();
    for object in objects {
        let doc_type = types.get(object.doc_type()).ok();
        let outcome = resolve_object(
            object,
            doc_type.as_deref(),
            states.ancestor.get(object),
            states.source.get(object),
            states.target.get(object),
            processor,
        );
        match outcome {
            Ok(value) => {
                out.merged.insert(object.clone(), value);
            }
            Err(conflicts) => {
                debug!(%object, conflicts = conflicts.len(), "object conflicts");
                out.conflicts.extend(conflicts);
            }
        }
    }
    out.conflicts.extend(detached_containers(objects, states));
    out.conflicts = dedup_conflicts(std::mem::take(&mut out.conflicts));
    out
}

/// Containers removed on one side while the other side changed one of their
/// components.
fn detached_containers(objects: &BTreeSet<ObjectId>, states: &States) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for container in objects.iter().filter(|o| states.ancestor.contains_key(*o)) {
        let sides = [
            (&states.source, &states.target),
            (&states.target, &states.source),
        ];
        for (removing, changing) in sides {
            if removing.contains_key(container) || !changing.contains_key(container) {
                continue;
            }
            for component in objects {
                let Some(changed) = changing.get(component) else {
                    continue;
                };
                if changed.container.as_ref() == Some(container)
                    && !same_document(Some(changed), states.ancestor.get(component))
                {
                    conflicts.push(Conflict::ContainerDetachedWithComponentChange {
                        container: container.clone(),
                        component: component.clone(),
                    });
                }
            }
        }
    }
    conflicts
}
