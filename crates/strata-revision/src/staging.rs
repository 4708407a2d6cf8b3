//! The write path: staging and committing revisions.
//!
//! A [`StagingArea`] buffers puts and removals for one branch. Nothing is
//! visible to any searcher until [`StagingArea::commit`] succeeds. A commit
//! runs in one storage transaction and, for every logical commit:
//!
//! 1. ages out the visible revision of each touched object by appending the
//!    commit point to its `revised` set (scoped to this branch),
//! 2. inserts the new revisions with `created` set to the commit point,
//! 3. stores a commit record.
//!
//! The branch head advances after the transaction. Version conflicts are
//! retried with backoff; exhaustion fails with `CommitFailed`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use strata_branch::{Branch, MergeSource};
use strata_diff::same_properties;
use strata_store::{Expression, StoreError, Update, Writer};
use strata_types::{ObjectId, Timestamp, MAX_TIMESTAMP};
use tracing::{debug, info, warn};

use crate::commit::{Commit, CommitResult, COMMIT_TYPE};
use crate::context::RevisionContext;
use crate::error::{RevisionError, RevisionResult};
use crate::filter::{open_ended_segments, visible_open_ended, ResolvedRef};
use crate::revision::{Document, Revision, FIELD_ID, FIELD_REVISED};
use crate::searcher::RevisionSearcher;

/// Pending changes of one logical commit, grouped by object.
#[derive(Clone, Debug, Default, PartialEq)]
struct Changes {
    puts: BTreeMap<ObjectId, Document>,
    removals: BTreeSet<ObjectId>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.removals.is_empty()
    }

    fn contains(&self, object: &ObjectId) -> bool {
        self.puts.contains_key(object) || self.removals.contains(object)
    }

    fn touched(&self) -> impl Iterator<Item = &ObjectId> {
        self.puts.keys().chain(self.removals.iter())
    }
}

#[derive(Clone, Debug)]
struct LogicalCommit {
    author: String,
    comment: String,
    changes: Changes,
}

#[derive(Clone, Debug)]
enum Target {
    Published(String),
    Detached(Branch),
}

/// Ephemeral per-commit write state bound to one branch.
pub struct StagingArea {
    ctx: RevisionContext,
    target: Target,
    sealed: Vec<LogicalCommit>,
    current: Changes,
    merge_source: Option<MergeSource>,
    expected_head: Option<Timestamp>,
}

impl StagingArea {
    pub(crate) fn on_branch(ctx: RevisionContext, path: &str) -> Self {
        Self::with_target(ctx, Target::Published(path.to_string()))
    }

    pub(crate) fn detached(ctx: RevisionContext, branch: Branch) -> Self {
        Self::with_target(ctx, Target::Detached(branch))
    }

    fn with_target(ctx: RevisionContext, target: Target) -> Self {
        Self {
            ctx,
            target,
            sealed: Vec::new(),
            current: Changes::default(),
            merge_source: None,
            expected_head: None,
        }
    }

    /// Path of the branch this staging area writes to.
    pub fn branch_path(&self) -> &str {
        match &self.target {
            Target::Published(path) => path,
            Target::Detached(branch) => &branch.path,
        }
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.sealed.iter().all(|c| c.changes.is_empty())
    }

    /// Record that the commit merges `source` into this branch.
    pub fn set_merge_source(&mut self, source: MergeSource) {
        self.merge_source = Some(source);
    }

    /// Fail the commit with `StaleHead` unless the branch head is still `ts`.
    ///
    /// Used by merges, whose staged values are only valid against the head
    /// they were computed from.
    pub fn expect_head(&mut self, ts: Timestamp) {
        self.expected_head = Some(ts);
    }

    fn check_type(&self, object: &ObjectId) -> RevisionResult<()> {
        if object.doc_type() == COMMIT_TYPE {
            return Err(RevisionError::ReservedType(COMMIT_TYPE.to_string()));
        }
        self.ctx.types.get(object.doc_type())?;
        Ok(())
    }

    /// Stage the full new state of an object.
    ///
    /// Fails with `DuplicateRevision` if the object is already staged in
    /// the current logical commit.
    pub fn put(&mut self, doc: Document) -> RevisionResult<()> {
        self.check_type(&doc.object)?;
        if self.current.contains(&doc.object) {
            return Err(RevisionError::DuplicateRevision(doc.object));
        }
        self.current.puts.insert(doc.object.clone(), doc);
        Ok(())
    }

    /// Stage the removal of objects. Unknown ids are ignored at commit.
    pub fn remove<I, S>(&mut self, doc_type: &str, ids: I) -> RevisionResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let object = ObjectId::new(doc_type, id);
            self.check_type(&object)?;
            if self.current.contains(&object) {
                return Err(RevisionError::DuplicateRevision(object));
            }
            self.current.removals.insert(object);
        }
        Ok(())
    }

    /// Close the current logical commit and start a new one.
    ///
    /// Every sealed commit is written with its own timestamp and commit
    /// record, in order, within the same storage transaction.
    pub fn seal(&mut self, author: impl Into<String>, comment: impl Into<String>) {
        let changes = std::mem::take(&mut self.current);
        if !changes.is_empty() {
            self.sealed.push(LogicalCommit {
                author: author.into(),
                comment: comment.into(),
                changes,
            });
        }
    }

    /// Write every staged change.
    ///
    /// An empty staging area commits nothing, returns the unchanged branch,
    /// and notifies nobody.
    pub fn commit(mut self, author: impl Into<String>, comment: impl Into<String>) -> RevisionResult<CommitResult> {
        self.seal(author, comment);
        let path = self.branch_path().to_string();
        if self.sealed.is_empty() {
            return Ok(CommitResult {
                branch: self.current_branch()?,
                commits: Vec::new(),
            });
        }

        let max_attempts = self.ctx.commit.max_attempts.max(1);
        let mut attempt = 0;
        let (branch, commits) = loop {
            attempt += 1;
            match self.try_commit() {
                Ok(done) => break done,
                Err(RevisionError::Store(e)) if e.is_transient() => {
                    if attempt >= max_attempts {
                        return Err(RevisionError::CommitFailed {
                            branch: path,
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    let delay = self.backoff(attempt);
                    warn!(branch = %path, attempt, delay_ms = delay.as_millis() as u64, error = %e, "commit conflicted; retrying");
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        };

        let Some(last) = commits.last() else {
            debug!(branch = %path, "all staged changes were no-ops");
            return Ok(CommitResult { branch, commits });
        };
        let head = last.timestamp;
        let merge_source = last.merge_source.clone();
        let branch = match &mut self.target {
            Target::Published(_) => self
                .ctx
                .branches
                .advance_head(&path, branch.branch_id, head, merge_source)
                .map_err(|e| RevisionError::CommitFailed {
                    branch: path.clone(),
                    attempts: attempt,
                    reason: e.to_string(),
                })?,
            Target::Detached(detached) => {
                detached.advance(head);
                detached.merge_sources.extend(merge_source);
                detached.clone()
            }
        };

        let result = CommitResult { branch, commits };
        info!(
            branch = %path,
            head,
            commits = result.commits.len(),
            added = result.added(),
            changed = result.changed(),
            removed = result.removed(),
            "committed"
        );
        Ok(result)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.ctx.commit.backoff(attempt);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }

    fn current_branch(&self) -> RevisionResult<Branch> {
        match &self.target {
            Target::Published(path) => Ok(self.ctx.branches.get_branch(path)?),
            Target::Detached(branch) => Ok(branch.clone()),
        }
    }

    /// One commit attempt against the latest committed state.
    fn try_commit(&self) -> RevisionResult<(Branch, Vec<Commit>)> {
        let branch = self.current_branch()?;
        if let Some(expected) = self.expected_head.filter(|ts| *ts != branch.head_timestamp) {
            return Err(RevisionError::StaleHead {
                branch: branch.path,
                expected,
                actual: branch.head_timestamp,
            });
        }
        self.ctx.clock.observe(branch.head_timestamp);

        // The searcher is opened first so it never sees more than the writer.
        let view = RevisionSearcher::new(Arc::from(self.ctx.index.searcher()?), open_ended_view(&branch));
        let mut writer = self.ctx.index.writer()?;

        let first_ts = self.ctx.clock.next();
        guard_head(writer.as_mut(), &branch, first_ts)?;

        let mut visible: BTreeMap<ObjectId, Option<Document>> = BTreeMap::new();
        let mut commits = Vec::new();
        for (i, logical) in self.sealed.iter().enumerate() {
            load_missing(&view, &mut visible, logical.changes.touched())?;
            let ts = if i == 0 { first_ts } else { self.ctx.clock.next() };
            let point = branch.point(ts);

            let mut aged: BTreeMap<String, Vec<String>> = BTreeMap::new();
            let mut rows = Vec::new();
            let (mut added, mut changed, mut removed) = (0, 0, 0);
            for (object, doc) in &logical.changes.puts {
                match visible.get(object).and_then(Option::as_ref) {
                    Some(prev) if prev.container == doc.container && same_properties(&prev.properties, &doc.properties) => {
                        continue;
                    }
                    Some(_) => {
                        changed += 1;
                        aged.entry(object.doc_type().to_string())
                            .or_default()
                            .push(object.id().to_string());
                    }
                    None => added += 1,
                }
                rows.push(Revision::new(
                    object.clone(),
                    point,
                    doc.container.clone(),
                    doc.properties.clone(),
                ));
            }
            for object in &logical.changes.removals {
                if matches!(visible.get(object), Some(Some(_))) {
                    removed += 1;
                    aged.entry(object.doc_type().to_string())
                        .or_default()
                        .push(object.id().to_string());
                }
            }
            if added + changed + removed == 0 {
                continue;
            }

            for (doc_type, ids) in &aged {
                let filter = Expression::and([
                    Expression::match_any(FIELD_ID, ids.iter().cloned()),
                    visible_open_ended(&branch),
                ]);
                let update = Update::Append {
                    field: FIELD_REVISED.to_string(),
                    value: Value::String(point.encode()),
                };
                let matched = writer.bulk_update(doc_type, &filter, &update)?;
                if matched != ids.len() {
                    return Err(StoreError::VersionConflict {
                        doc_type: doc_type.clone(),
                        detail: format!("expected to age {} revisions, matched {matched}", ids.len()),
                    }
                    .into());
                }
            }
            for row in rows {
                writer.put(row.to_document())?;
            }

            for (object, doc) in &logical.changes.puts {
                visible.insert(object.clone(), Some(doc.clone()));
            }
            for object in &logical.changes.removals {
                visible.insert(object.clone(), None);
            }

            commits.push(Commit {
                branch_path: branch.path.clone(),
                branch_id: branch.branch_id,
                timestamp: ts,
                author: logical.author.clone(),
                comment: logical.comment.clone(),
                added,
                changed,
                removed,
                merge_source: None,
            });
        }

        if commits.is_empty() {
            return Ok((branch, commits));
        }
        if let (Some(source), Some(last)) = (&self.merge_source, commits.last_mut()) {
            last.merge_source = Some(MergeSource {
                target_timestamp: last.timestamp,
                ..source.clone()
            });
        }
        for commit in &commits {
            writer.put(commit.to_document()?)?;
        }
        writer.commit()?;
        Ok((branch, commits))
    }
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea")
            .field("target", &self.target)
            .field("sealed", &self.sealed.len())
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// The branch with its own segment unbounded above.
fn open_ended_view(branch: &Branch) -> ResolvedRef {
    ResolvedRef {
        branch: branch.clone(),
        segments: open_ended_segments(branch),
        timestamp: MAX_TIMESTAMP,
    }
}

/// Fail the transaction if another commit on this branch lands at or after
/// `first_ts` before ours does.
fn guard_head(writer: &mut dyn Writer, branch: &Branch, first_ts: u64) -> RevisionResult<()> {
    let later = Expression::and([
        Expression::exact_match("branch_id", branch.branch_id),
        Expression::Range {
            field: "timestamp".to_string(),
            from: Some(first_ts.into()),
            to: None,
        },
    ]);
    let touch = Update::Set {
        field: "head_guard".to_string(),
        value: Value::Bool(true),
    };
    let matched = writer.bulk_update(COMMIT_TYPE, &later, &touch)?;
    if matched > 0 {
        return Err(StoreError::VersionConflict {
            doc_type: COMMIT_TYPE.to_string(),
            detail: format!("branch {} already has a commit at or after {first_ts}", branch.path),
        }
        .into());
    }
    Ok(())
}

/// Load the visible state of every object not yet in `visible`.
fn load_missing<'a>(
    view: &RevisionSearcher,
    visible: &mut BTreeMap<ObjectId, Option<Document>>,
    objects: impl Iterator<Item = &'a ObjectId>,
) -> RevisionResult<()> {
    let mut by_type: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for object in objects.filter(|o| !visible.contains_key(*o)) {
        by_type
            .entry(object.doc_type())
            .or_default()
            .push(object.id().to_string());
    }
    for (doc_type, ids) in by_type {
        let found = view.get_all(doc_type, ids.iter().cloned())?;
        for id in ids {
            let doc = found.get(&id).map(Document::from);
            visible.insert(ObjectId::new(doc_type, id), doc);
        }
    }
    Ok(())
}
