//! Merge and rebase.
//!
//! A [`MergeRequest`] brings the changes of a source branch onto a target:
//!
//! - If the source is the target's parent, the target is **rebased**: it is
//!   reopened on the parent's current head and its own changes are replayed
//!   on top, merged against the parent's.
//! - Otherwise a **merge commit** on the target applies the source's changes,
//!   merged against the target's, and records the merge so the next merge
//!   from the same source starts from here.
//!
//! Either way nothing is written when any hard conflict remains.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_branch::{Branch, MergeSource, Segment};
use strata_revision::{CommitResult, Document, RevisionContext, RevisionError, StagingArea};
use strata_types::ObjectId;
use tracing::{debug, info};

use crate::classify::{classify, resolve_object, same_document};
use crate::conflict::{ConflictProcessor, DefaultConflictProcessor};
use crate::divergence::{load, Divergence, States};
use crate::error::{MergeError, MergeResult};

/// Author recorded on merge commits unless the request names one.
pub const DEFAULT_MERGE_AUTHOR: &str = "strata";

/// How the source's changes reach the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeKind {
    /// Merge commit on the target.
    Merge,
    /// Reopen the target (a child of the source) on the source's head.
    Rebase,
}

/// A prepared merge of `source` into `target`.
pub struct MergeRequest {
    ctx: RevisionContext,
    source: String,
    target: String,
    squash: bool,
    author: String,
    comment: Option<String>,
    timeout: Duration,
    processor: Arc<dyn ConflictProcessor>,
}

impl MergeRequest {
    pub fn new(ctx: RevisionContext, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            ctx,
            source: source.into(),
            target: target.into(),
            squash: true,
            author: DEFAULT_MERGE_AUTHOR.to_string(),
            comment: None,
            timeout: Duration::from_secs(60),
            processor: Arc::new(DefaultConflictProcessor),
        }
    }

    /// `true` writes one commit; `false` replays every commit boundary.
    pub fn squash(mut self, squash: bool) -> Self {
        self.squash = squash;
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the change-versus-removal policy.
    pub fn conflict_processor(mut self, processor: Arc<dyn ConflictProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Run the merge.
    ///
    /// Returns the target's commit result: unchanged and empty when the
    /// source has nothing new. Fails with `BranchMergeConflict` carrying
    /// every conflict, or `MergeTimeout`; in both cases nothing is written.
    pub fn merge(self) -> MergeResult<CommitResult> {
        let started = Instant::now();
        if self.source == self.target {
            return Err(MergeError::SameBranch(self.source));
        }

        let divergence = Divergence::open(&self.ctx, &self.source, &self.target)?;
        let kind = if divergence.target.parent_path.as_deref() == Some(divergence.source.path.as_str()) {
            MergeKind::Rebase
        } else {
            MergeKind::Merge
        };

        let source_touched = divergence.touched(&divergence.source_ranges)?;
        if source_touched.is_empty() {
            info!(source = %self.source, target = %self.target, "target is up to date");
            return Ok(CommitResult {
                branch: divergence.target,
                commits: Vec::new(),
            });
        }
        let target_touched = divergence.touched(&divergence.target_ranges)?;
        self.check_deadline(started)?;

        let objects: BTreeSet<ObjectId> = source_touched.union(&target_touched).cloned().collect();
        let states = States::load(&divergence, &objects)?;
        let classification = classify(&objects, &states, &self.ctx.types, self.processor.as_ref());
        debug!(
            ?kind,
            source_touched = source_touched.len(),
            target_touched = target_touched.len(),
            merged = classification.merged.len(),
            conflicts = classification.conflicts.len(),
            "classified merge"
        );
        if !classification.conflicts.is_empty() {
            info!(
                source = %self.source,
                target = %self.target,
                conflicts = classification.conflicts.len(),
                "merge blocked by conflicts"
            );
            return Err(MergeError::BranchMergeConflict(classification.conflicts));
        }
        self.check_deadline(started)?;

        let plan = Plan {
            kind,
            merged: classification.merged,
            states,
            started,
        };
        let result = match kind {
            MergeKind::Merge => self.commit_merge(&divergence, plan)?,
            MergeKind::Rebase => self.commit_rebase(&divergence, plan)?,
        };
        info!(
            source = %self.source,
            target = %self.target,
            ?kind,
            head = result.head_timestamp(),
            commits = result.commits.len(),
            "merged"
        );
        Ok(result)
    }

    fn check_deadline(&self, started: Instant) -> MergeResult<()> {
        let elapsed = started.elapsed();
        if elapsed > self.timeout {
            return Err(MergeError::MergeTimeout {
                elapsed,
                limit: self.timeout,
            });
        }
        Ok(())
    }

    fn default_comment(&self, kind: MergeKind) -> String {
        match kind {
            MergeKind::Merge => format!("Merge {} into {}", self.source, self.target),
            MergeKind::Rebase => format!("Rebase {} on {}", self.target, self.source),
        }
    }

    fn commit_merge(&self, divergence: &Divergence, plan: Plan) -> MergeResult<CommitResult> {
        let mut staging = self.ctx.open_writer(&divergence.target.path)?;
        staging.expect_head(divergence.target.head_timestamp);
        staging.set_merge_source(MergeSource {
            source_path: divergence.source.path.clone(),
            source_branch_id: divergence.source.branch_id,
            source_timestamp: divergence.source.head_timestamp,
            target_timestamp: divergence.target.head_timestamp,
        });
        self.stage(&mut staging, divergence, &plan, &divergence.source, &divergence.source_ranges)?;
        Ok(staging.commit(&self.author, self.comment_for(plan.kind))?)
    }

    fn commit_rebase(&self, divergence: &Divergence, plan: Plan) -> MergeResult<CommitResult> {
        let expected = &divergence.target;
        let reopened = self.ctx.branches.prepare_reopen(&expected.path)?;
        if reopened.base_timestamp != divergence.source.head_timestamp {
            return Err(RevisionError::StaleHead {
                branch: divergence.source.path.clone(),
                expected: divergence.source.head_timestamp,
                actual: reopened.base_timestamp,
            }
            .into());
        }

        let mut staging = self.ctx.open_detached(reopened);
        self.stage(&mut staging, divergence, &plan, expected, &divergence.target_ranges)?;
        let result = staging.commit(&self.author, self.comment_for(plan.kind))?;
        let published = self.ctx.branches.publish_reopen(expected, result.branch)?;
        Ok(CommitResult {
            branch: published,
            commits: result.commits,
        })
    }

    fn comment_for(&self, kind: MergeKind) -> String {
        self.comment.clone().unwrap_or_else(|| self.default_comment(kind))
    }

    /// Stage every object whose merged state differs from what the receiving
    /// branch sees, either at once or replaying `replayed`'s commits.
    fn stage(
        &self,
        staging: &mut StagingArea,
        divergence: &Divergence,
        plan: &Plan,
        replayed: &Branch,
        ranges: &[Segment],
    ) -> MergeResult<()> {
        let receiving = plan.receiving();
        let writes: BTreeMap<&ObjectId, Option<&Document>> = plan
            .merged
            .iter()
            .filter(|(object, merged)| !same_document(merged.as_ref(), receiving.get(*object)))
            .map(|(object, merged)| (object, merged.as_ref()))
            .collect();
        if writes.is_empty() {
            return Ok(());
        }

        let mut current: BTreeMap<ObjectId, Option<Document>> = writes
            .keys()
            .map(|object| ((*object).clone(), receiving.get(*object).cloned()))
            .collect();

        if !self.squash {
            let view = divergence.view(replayed, None);
            for commit in view.commits_in(ranges)? {
                self.check_deadline(plan.started)?;
                let step: BTreeSet<ObjectId> = divergence
                    .touched_at(commit.point())?
                    .into_iter()
                    .filter(|object| writes.contains_key(object))
                    .collect();
                if step.is_empty() {
                    continue;
                }
                let at_commit = load(&divergence.view(replayed, Some(commit.timestamp)), &step)?;
                for object in &step {
                    let value = plan
                        .step_value(self, object, at_commit.get(object))
                        .unwrap_or_else(|| writes[object].cloned());
                    if !same_document(current[object].as_ref(), value.as_ref()) {
                        stage_one(staging, object, value.as_ref())?;
                        current.insert(object.clone(), value);
                    }
                }
                staging.seal(&commit.author, &commit.comment);
            }
        }

        for (object, value) in &writes {
            if !same_document(current[*object].as_ref(), *value) {
                stage_one(staging, object, *value)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MergeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeRequest")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("squash", &self.squash)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A classified, conflict-free merge ready to be staged.
struct Plan {
    kind: MergeKind,
    merged: BTreeMap<ObjectId, Option<Document>>,
    states: States,
    started: Instant,
}

impl Plan {
    /// What the branch receiving the writes already sees.
    fn receiving(&self) -> &BTreeMap<ObjectId, Document> {
        match self.kind {
            MergeKind::Merge => &self.states.target,
            MergeKind::Rebase => &self.states.source,
        }
    }

    /// Merged state of `object` at one replayed commit, or `None` when that
    /// step would conflict and the final merged state should be used.
    fn step_value(
        &self,
        request: &MergeRequest,
        object: &ObjectId,
        at_commit: Option<&Document>,
    ) -> Option<Option<Document>> {
        let ancestor = self.states.ancestor.get(object);
        let (source, target) = match self.kind {
            MergeKind::Merge => (at_commit, self.states.target.get(object)),
            MergeKind::Rebase => (self.states.source.get(object), at_commit),
        };
        let doc_type = request.ctx.types.get(object.doc_type()).ok();
        resolve_object(object, doc_type.as_deref(), ancestor, source, target, request.processor.as_ref()).ok()
    }
}

fn stage_one(staging: &mut StagingArea, object: &ObjectId, value: Option<&Document>) -> MergeResult<()> {
    match value {
        Some(doc) => staging.put(doc.clone())?,
        None => staging.remove(object.doc_type(), [object.id()])?,
    }
    Ok(())
}
