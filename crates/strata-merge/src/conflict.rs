//! The conflict model.
//!
//! A [`Conflict`] is a change on the source that cannot be applied to the
//! target automatically. Conflicts compare structurally, which is what
//! [`dedup_conflicts`] relies on.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_diff::RevisionPropertyDiff;
use strata_types::ObjectId;

/// A hard merge conflict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    /// Both sides added the same object with different content.
    AddedInSourceAndTarget { object: ObjectId },

    /// The source changed an object the target removed.
    ChangedInSourceAndDetachedInTarget {
        object: ObjectId,
        changes: Vec<RevisionPropertyDiff>,
    },

    /// The source removed an object the target changed.
    DetachedInSourceAndChangedInTarget {
        object: ObjectId,
        changes: Vec<RevisionPropertyDiff>,
    },

    /// Both sides changed the same property to different values.
    ChangedInSourceAndTarget {
        object: ObjectId,
        property: String,
        source_value: Value,
        target_value: Value,
    },

    /// One side removed a container the other side changed a component of.
    ContainerDetachedWithComponentChange { container: ObjectId, component: ObjectId },
}

impl Conflict {
    /// The object the conflict is reported on.
    pub fn object(&self) -> &ObjectId {
        match self {
            Conflict::AddedInSourceAndTarget { object }
            | Conflict::ChangedInSourceAndDetachedInTarget { object, .. }
            | Conflict::DetachedInSourceAndChangedInTarget { object, .. }
            | Conflict::ChangedInSourceAndTarget { object, .. } => object,
            Conflict::ContainerDetachedWithComponentChange { component, .. } => component,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::AddedInSourceAndTarget { object } => {
                write!(f, "{object} was added on both sides with different content")
            }
            Conflict::ChangedInSourceAndDetachedInTarget { object, changes } => write!(
                f,
                "{object} was changed in source ({}) but removed in target",
                property_names(changes)
            ),
            Conflict::DetachedInSourceAndChangedInTarget { object, changes } => write!(
                f,
                "{object} was removed in source but changed in target ({})",
                property_names(changes)
            ),
            Conflict::ChangedInSourceAndTarget {
                object,
                property,
                source_value,
                target_value,
            } => write!(
                f,
                "{object}.{property} was changed to {source_value} in source and {target_value} in target"
            ),
            Conflict::ContainerDetachedWithComponentChange { container, component } => write!(
                f,
                "{container} was removed while its component {component} was changed"
            ),
        }
    }
}

fn property_names(changes: &[RevisionPropertyDiff]) -> String {
    changes.iter().map(|c| c.property.as_str()).collect::<Vec<_>>().join(", ")
}

/// Drop structurally equal conflicts, keeping the first occurrence.
pub fn dedup_conflicts(conflicts: Vec<Conflict>) -> Vec<Conflict> {
    let mut out: Vec<Conflict> = Vec::with_capacity(conflicts.len());
    for conflict in conflicts {
        if !out.contains(&conflict) {
            out.push(conflict);
        }
    }
    out
}

/// Decides the change-versus-removal cases of a merge.
///
/// Returning `None` lets the removal win silently; returning a conflict
/// blocks the merge.
pub trait ConflictProcessor: Send + Sync {
    /// The source changed `object` (by `changes`) and the target removed it.
    fn changed_in_source_detached_in_target(
        &self,
        object: &ObjectId,
        changes: Vec<RevisionPropertyDiff>,
    ) -> Option<Conflict>;

    /// The source removed `object` and the target changed it (by `changes`).
    fn detached_in_source_changed_in_target(
        &self,
        object: &ObjectId,
        changes: Vec<RevisionPropertyDiff>,
    ) -> Option<Conflict>;
}

/// Removal always wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConflictProcessor;

impl ConflictProcessor for DefaultConflictProcessor {
    fn changed_in_source_detached_in_target(&self, _: &ObjectId, _: Vec<RevisionPropertyDiff>) -> Option<Conflict> {
        None
    }

    fn detached_in_source_changed_in_target(&self, _: &ObjectId, _: Vec<RevisionPropertyDiff>) -> Option<Conflict> {
        None
    }
}

/// Every change-versus-removal pair is a conflict.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictConflictProcessor;

impl ConflictProcessor for StrictConflictProcessor {
    fn changed_in_source_detached_in_target(
        &self,
        object: &ObjectId,
        changes: Vec<RevisionPropertyDiff>,
    ) -> Option<Conflict> {
        Some(Conflict::ChangedInSourceAndDetachedInTarget {
            object: object.clone(),
            changes,
        })
    }

    fn detached_in_source_changed_in_target(
        &self,
        object: &ObjectId,
        changes: Vec<RevisionPropertyDiff>,
    ) -> Option<Conflict> {
        Some(Conflict::DetachedInSourceAndChangedInTarget {
            object: object.clone(),
            changes,
        })
    }
}
