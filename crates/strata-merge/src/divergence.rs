//! Where two branches diverged and what each changed since.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use strata_branch::{segments_beyond, Branch, Segment};
use strata_revision::{Document, RevisionContext, RevisionError, RevisionSearcher, ResolvedRef};
use strata_types::{BranchPoint, ObjectId, Timestamp};
use tracing::debug;

use crate::ancestor::common_ancestor;
use crate::error::MergeResult;

/// Two branches, their common ancestor, and one storage snapshot to read
/// all three through.
pub(crate) struct Divergence {
    pub source: Branch,
    pub target: Branch,
    pub ancestor: Vec<Segment>,
    /// Source windows not covered by the ancestor.
    pub source_ranges: Vec<Segment>,
    /// Target windows not covered by the ancestor.
    pub target_ranges: Vec<Segment>,
    pub doc_types: Vec<String>,
    snapshot: RevisionSearcher,
}

impl Divergence {
    pub fn open(ctx: &RevisionContext, source_path: &str, target_path: &str) -> MergeResult<Self> {
        let source = ctx.branches.get_branch(source_path)?;
        let target = ctx.branches.get_branch(target_path)?;
        // Branches first: rows past their heads stay invisible to the views.
        let snapshot = RevisionSearcher::new(Arc::from(ctx.index.searcher()?), ResolvedRef::new(target.clone(), None));
        let ancestor = common_ancestor(&source, &target);
        let source_ranges = segments_beyond(&source.segments, &ancestor);
        let target_ranges = segments_beyond(&target.segments, &ancestor);
        let doc_types = ctx.types.names().map_err(RevisionError::from)?;
        debug!(
            source = %source.path,
            target = %target.path,
            ?ancestor,
            ?source_ranges,
            ?target_ranges,
            "resolved divergence"
        );
        Ok(Self {
            source,
            target,
            ancestor,
            source_ranges,
            target_ranges,
            doc_types,
            snapshot,
        })
    }

    pub fn ancestor_view(&self) -> RevisionSearcher {
        self.snapshot.with_segments(self.ancestor.clone())
    }

    /// `branch` at its head, or at `ts`.
    pub fn view(&self, branch: &Branch, ts: Option<Timestamp>) -> RevisionSearcher {
        self.snapshot.view(ResolvedRef::new(branch.clone(), ts))
    }

    /// Objects with a revision written or superseded inside `ranges`.
    pub fn touched(&self, ranges: &[Segment]) -> MergeResult<BTreeSet<ObjectId>> {
        let mut out = BTreeSet::new();
        if ranges.is_empty() {
            return Ok(out);
        }
        for doc_type in &self.doc_types {
            for id in self.snapshot.touched_ids(doc_type, ranges)? {
                out.insert(ObjectId::new(doc_type, id));
            }
        }
        Ok(out)
    }

    /// Objects with a revision written or superseded exactly at `point`.
    pub fn touched_at(&self, point: BranchPoint) -> MergeResult<BTreeSet<ObjectId>> {
        let mut out = BTreeSet::new();
        for doc_type in &self.doc_types {
            for id in self.snapshot.touched_ids_at(doc_type, point)? {
                out.insert(ObjectId::new(doc_type, id));
            }
        }
        Ok(out)
    }
}

/// Visible state of `objects` through `view`. Absent objects are left out.
pub(crate) fn load(view: &RevisionSearcher, objects: &BTreeSet<ObjectId>) -> MergeResult<BTreeMap<ObjectId, Document>> {
    let mut by_type: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for object in objects {
        by_type
            .entry(object.doc_type())
            .or_default()
            .push(object.id().to_string());
    }
    let mut out = BTreeMap::new();
    for (doc_type, ids) in by_type {
        for (id, revision) in view.get_all(doc_type, ids)? {
            out.insert(ObjectId::new(doc_type, id), Document::from(&revision));
        }
    }
    Ok(out)
}

/// Ancestor, source, and target state of a set of objects.
#[derive(Debug, Default)]
pub(crate) struct States {
    pub ancestor: BTreeMap<ObjectId, Document>,
    pub source: BTreeMap<ObjectId, Document>,
    pub target: BTreeMap<ObjectId, Document>,
}

impl States {
    pub fn load(divergence: &Divergence, objects: &BTreeSet<ObjectId>) -> MergeResult<Self> {
        Ok(Self {
            ancestor: load(&divergence.ancestor_view(), objects)?,
            source: load(&divergence.view(&divergence.source, None), objects)?,
            target: load(&divergence.view(&divergence.target, None), objects)?,
        })
    }
}
