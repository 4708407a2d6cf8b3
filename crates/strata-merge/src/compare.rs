//! Read-only branch comparison.
//!
//! Reports what the compared branch changed since it diverged from the
//! base, object by object. Nothing is written and conflicts are not checked.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strata_diff::{diff_properties, RevisionPropertyDiff};
use strata_revision::{Document, RevisionContext};
use strata_types::ObjectId;
use tracing::debug;

use crate::classify::same_document;
use crate::divergence::{load, Divergence};
use crate::error::MergeResult;

/// Kind of change reported by a compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompareOp {
    Add,
    Change,
    Remove,
}

/// One reported change.
///
/// Component details name the container in `object` and the changed
/// component in `component`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionCompareDetail {
    pub op: CompareOp,
    pub object: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ObjectId>,
    pub property_diffs: Vec<RevisionPropertyDiff>,
}

impl RevisionCompareDetail {
    /// Returns `true` for a change reported on a container for one of its components.
    pub fn is_component_change(&self) -> bool {
        self.component.is_some()
    }
}

/// Outcome of comparing two branches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionCompare {
    pub base: String,
    pub compare: String,
    /// Objects added on the compared branch.
    pub added: usize,
    /// Objects changed on the compared branch.
    pub changed: usize,
    /// Objects removed on the compared branch.
    pub removed: usize,
    /// At most `limit` details, ordered by type, then id.
    pub details: Vec<RevisionCompareDetail>,
    pub limit: usize,
    /// More details exist than were returned.
    pub is_limited: bool,
}

impl RevisionCompare {
    /// Number of changed objects.
    pub fn total(&self) -> usize {
        self.added + self.changed + self.removed
    }

    /// Returns `true` if the compared branch changed nothing.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// A prepared comparison of `compare` against `base`.
#[derive(Clone, Debug)]
pub struct CompareRequest {
    ctx: RevisionContext,
    base: String,
    compare: String,
    limit: usize,
    exclude_component_changes: bool,
}

impl CompareRequest {
    pub fn new(ctx: RevisionContext, base: impl Into<String>, compare: impl Into<String>) -> Self {
        Self {
            ctx,
            base: base.into(),
            compare: compare.into(),
            limit: 100,
            exclude_component_changes: false,
        }
    }

    /// Maximum number of details to return. Totals are never limited.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skip the container-level details reported for changed components.
    pub fn exclude_component_changes(mut self, exclude: bool) -> Self {
        self.exclude_component_changes = exclude;
        self
    }

    pub fn compare(self) -> MergeResult<RevisionCompare> {
        let divergence = Divergence::open(&self.ctx, &self.compare, &self.base)?;
        let touched = divergence.touched(&divergence.source_ranges)?;
        let ancestor = load(&divergence.ancestor_view(), &touched)?;
        let compared = load(&divergence.view(&divergence.source, None), &touched)?;

        let (mut added, mut changed, mut removed) = (0, 0, 0);
        let mut details = Vec::new();
        let mut containers: BTreeSet<(ObjectId, ObjectId, CompareOp)> = BTreeSet::new();
        for object in &touched {
            let before = ancestor.get(object);
            let after = compared.get(object);
            if same_document(before, after) {
                continue;
            }
            let (op, property_diffs) = match (before, after) {
                (None, Some(doc)) => {
                    added += 1;
                    (CompareOp::Add, diff_properties(&Default::default(), &doc.properties))
                }
                (Some(doc), None) => {
                    removed += 1;
                    (CompareOp::Remove, diff_properties(&doc.properties, &Default::default()))
                }
                (Some(old), Some(new)) => {
                    changed += 1;
                    (CompareOp::Change, diff_properties(&old.properties, &new.properties))
                }
                (None, None) => continue,
            };
            if let Some(container) = after.or(before).and_then(|d: &Document| d.container.clone()) {
                containers.insert((container, object.clone(), op));
            }
            details.push(RevisionCompareDetail {
                op,
                object: object.clone(),
                component: None,
                property_diffs,
            });
        }

        if !self.exclude_component_changes {
            for (container, component, op) in containers {
                details.push(RevisionCompareDetail {
                    op,
                    object: container,
                    component: Some(component),
                    property_diffs: Vec::new(),
                });
            }
        }
        details.sort_by(|a, b| (&a.object, &a.component).cmp(&(&b.object, &b.component)));
        let is_limited = details.len() > self.limit;
        details.truncate(self.limit);

        debug!(
            base = %self.base,
            compare = %self.compare,
            added,
            changed,
            removed,
            details = details.len(),
            is_limited,
            "compared branches"
        );
        Ok(RevisionCompare {
            base: self.base,
            compare: self.compare,
            added,
            changed,
            removed,
            details,
            limit: self.limit,
            is_limited,
        })
    }
}
