//! Branch-scoped revision reads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use strata_branch::{BranchManager, Segment};
use strata_store::{Expression, Hits, Index, Query, Searcher};
use strata_types::{BranchPoint, ObjectId, Timestamp};
use tracing::warn;

use crate::commit::{Commit, COMMIT_TYPE};
use crate::error::RevisionResult;
use crate::filter::{touched_at, touched_in, visible, BranchRef, ResolvedRef};
use crate::revision::{Revision, FIELD_CONTAINER, FIELD_ID};

/// Read access to the revisions visible through one segment list.
///
/// All views derived with [`RevisionSearcher::view`] share the same storage
/// snapshot, so reads across views are mutually consistent.
#[derive(Clone)]
pub struct RevisionSearcher {
    searcher: Arc<dyn Searcher>,
    resolved: ResolvedRef,
}

impl RevisionSearcher {
    /// Open a searcher on `branch_ref` over the latest committed state.
    pub fn open(index: &dyn Index, branches: &dyn BranchManager, branch_ref: &BranchRef) -> RevisionResult<Self> {
        let resolved = branch_ref.resolve(branches)?;
        Ok(Self {
            searcher: Arc::from(index.searcher()?),
            resolved,
        })
    }

    /// Wrap an existing storage snapshot.
    pub fn new(searcher: Arc<dyn Searcher>, resolved: ResolvedRef) -> Self {
        Self { searcher, resolved }
    }

    /// Another view over the same snapshot.
    pub fn view(&self, resolved: ResolvedRef) -> Self {
        Self {
            searcher: Arc::clone(&self.searcher),
            resolved,
        }
    }

    /// The same branch seen through `segments` instead (used for ancestors).
    pub fn with_segments(&self, segments: Vec<Segment>) -> Self {
        let mut resolved = self.resolved.clone();
        resolved.timestamp = segments.last().map_or(0, |s| s.to);
        resolved.segments = segments;
        self.view(resolved)
    }

    pub fn resolved(&self) -> &ResolvedRef {
        &self.resolved
    }

    pub fn branch_path(&self) -> &str {
        &self.resolved.branch.path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.resolved.segments
    }

    pub fn timestamp(&self) -> Timestamp {
        self.resolved.timestamp
    }

    /// The visible revision of `object`, if any.
    pub fn get(&self, object: &ObjectId) -> RevisionResult<Option<Revision>> {
        let mut found = self.get_all(object.doc_type(), [object.id().to_string()])?;
        Ok(found.remove(object.id()))
    }

    /// Visible revisions of the given ids of one type, keyed by id.
    pub fn get_all<I>(&self, doc_type: &str, ids: I) -> RevisionResult<BTreeMap<String, Revision>>
    where
        I: IntoIterator<Item = String>,
    {
        let ids: Vec<String> = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let filter = Expression::and([Expression::match_any(FIELD_ID, ids), visible(self.segments())]);
        let hits = self.searcher.search(&Query::new(doc_type, filter))?;

        let mut out: BTreeMap<String, Revision> = BTreeMap::new();
        for doc in hits {
            let revision = Revision::from_document(&doc)?;
            let id = revision.object.id().to_string();
            match out.get(&id) {
                Some(existing) => {
                    warn!(
                        object = %revision.object,
                        branch = self.branch_path(),
                        "more than one visible revision; keeping the newest"
                    );
                    if revision.created > existing.created {
                        out.insert(id, revision);
                    }
                }
                None => {
                    out.insert(id, revision);
                }
            }
        }
        Ok(out)
    }

    /// Visible revisions of one type matching `filter`.
    ///
    /// `filter` addresses row fields; properties live under `properties.`.
    pub fn search(&self, doc_type: &str, filter: Expression, limit: usize) -> RevisionResult<Hits<Revision>> {
        let query = Query::new(doc_type, Expression::and([filter, visible(self.segments())])).with_limit(limit);
        self.searcher
            .search(&query)?
            .try_map(|doc| Revision::from_document(&doc))
    }

    /// Visible components of `container` across `doc_types`.
    pub fn components_of(&self, container: &ObjectId, doc_types: &[String]) -> RevisionResult<Vec<Revision>> {
        let mut out = Vec::new();
        for doc_type in doc_types {
            let filter = Expression::exact_match(FIELD_CONTAINER, container.to_string());
            out.extend(self.search(doc_type, filter, usize::MAX)?);
        }
        Ok(out)
    }

    /// Ids of one type with a revision created or superseded inside `ranges`.
    ///
    /// Independent of this view's own segments.
    pub fn touched_ids(&self, doc_type: &str, ranges: &[Segment]) -> RevisionResult<BTreeSet<String>> {
        self.ids_matching(doc_type, touched_in(ranges))
    }

    /// Ids of one type with a revision created or superseded exactly at `point`.
    pub fn touched_ids_at(&self, doc_type: &str, point: BranchPoint) -> RevisionResult<BTreeSet<String>> {
        self.ids_matching(doc_type, touched_at(point))
    }

    fn ids_matching(&self, doc_type: &str, filter: Expression) -> RevisionResult<BTreeSet<String>> {
        let hits = self.searcher.search(&Query::new(doc_type, filter))?;
        Ok(hits
            .into_iter()
            .filter_map(|doc| doc.source.get(FIELD_ID).and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    /// Commits visible through this view, oldest first.
    pub fn commits(&self) -> RevisionResult<Vec<Commit>> {
        self.commits_in(self.segments())
    }

    /// Commits written inside `ranges`, oldest first.
    pub fn commits_in(&self, ranges: &[Segment]) -> RevisionResult<Vec<Commit>> {
        let filter = Expression::or(ranges.iter().map(|s| {
            Expression::and([
                Expression::exact_match("branch_id", s.branch_id),
                Expression::range("timestamp", s.from, s.to),
            ])
        }));
        let mut commits = self
            .searcher
            .search(&Query::new(COMMIT_TYPE, filter))?
            .into_iter()
            .map(|doc| Commit::from_document(&doc))
            .collect::<RevisionResult<Vec<_>>>()?;
        commits.sort_by_key(|c| (c.timestamp, c.branch_id));
        Ok(commits)
    }
}

impl std::fmt::Debug for RevisionSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionSearcher")
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strata_branch::MAIN;

    use super::*;
    use crate::context::RevisionContext;
    use crate::fixtures::context;
    use crate::revision::Document;

    fn commit(ctx: &RevisionContext, branch: &str, docs: Vec<Document>) -> Timestamp {
        let mut w = ctx.open_writer(branch).unwrap();
        for doc in docs {
            w.put(doc).unwrap();
        }
        w.commit("tester", "change").unwrap().head_timestamp()
    }

    fn head(ctx: &RevisionContext, branch: &str) -> RevisionSearcher {
        ctx.open_searcher(&BranchRef::head(branch)).unwrap()
    }

    #[test]
    fn components_are_found_by_container() {
        let ctx = context();
        let heart = ObjectId::new("concept", "heart");
        commit(
            &ctx,
            MAIN,
            vec![
                Document::new("concept", "heart"),
                Document::new("description", "d1").with("term", "heart").in_container(heart.clone()),
                Document::new("description", "d2").with("term", "cor").in_container(heart.clone()),
                Document::new("description", "d3").with("term", "lung"),
            ],
        );
        let components = head(&ctx, MAIN)
            .components_of(&heart, &["description".to_string()])
            .unwrap();
        let ids: BTreeSet<_> = components.iter().map(|r| r.object.id().to_string()).collect();
        assert_eq!(ids, BTreeSet::from(["d1".to_string(), "d2".to_string()]));
    }

    #[test]
    fn search_filters_on_properties_and_reports_totals() {
        let ctx = context();
        commit(
            &ctx,
            MAIN,
            (0..5)
                .map(|i| Document::new("concept", i.to_string()).with("active", i % 2 == 0))
                .collect(),
        );
        let hits = head(&ctx, MAIN)
            .search("concept", Expression::exact_match("properties.active", true), 2)
            .unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(hits.hits.len(), 2);
    }

    #[test]
    fn pinned_searcher_sees_past_state() {
        let ctx = context();
        let t1 = commit(&ctx, MAIN, vec![Document::new("concept", "1").with("v", 1)]);
        commit(&ctx, MAIN, vec![Document::new("concept", "1").with("v", 2)]);

        let past = ctx.open_searcher(&BranchRef::at(MAIN, t1)).unwrap();
        assert_eq!(past.timestamp(), t1);
        let rev = past.get(&ObjectId::new("concept", "1")).unwrap().unwrap();
        assert_eq!(rev.properties["v"], json!(1));
        assert_eq!(past.commits().unwrap().len(), 1);
        assert_eq!(head(&ctx, MAIN).commits().unwrap().len(), 2);
    }

    #[test]
    fn searcher_is_a_point_in_time_view() {
        let ctx = context();
        commit(&ctx, MAIN, vec![Document::new("concept", "1")]);
        let before = head(&ctx, MAIN);
        commit(&ctx, MAIN, vec![Document::new("concept", "2")]);
        assert!(before.get(&ObjectId::new("concept", "2")).unwrap().is_none());
        assert!(head(&ctx, MAIN).get(&ObjectId::new("concept", "2")).unwrap().is_some());
    }

    #[test]
    fn touched_ids_cover_changes_inside_ranges() {
        let ctx = context();
        commit(&ctx, MAIN, vec![Document::new("concept", "base")]);
        let task = ctx.branches.create_branch(MAIN, "task").unwrap();
        let t = commit(
            &ctx,
            "MAIN/task",
            vec![Document::new("concept", "base").with("v", 1), Document::new("concept", "new")],
        );

        let searcher = head(&ctx, "MAIN/task");
        let ranges = [Segment::new(task.branch_id, task.base_timestamp, t)];
        let touched = searcher.touched_ids("concept", &ranges).unwrap();
        assert_eq!(touched, BTreeSet::from(["base".to_string(), "new".to_string()]));
        assert_eq!(
            searcher
                .touched_ids_at("concept", BranchPoint::new(task.branch_id, t))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(searcher.commits_in(&ranges).unwrap().len(), 1);
    }

    #[test]
    fn ancestor_view_shares_the_snapshot() {
        let ctx = context();
        let t1 = commit(&ctx, MAIN, vec![Document::new("concept", "1").with("v", 1)]);
        commit(&ctx, MAIN, vec![Document::new("concept", "1").with("v", 2)]);

        let searcher = head(&ctx, MAIN);
        let ancestor = searcher.with_segments(vec![Segment::new(0, 0, t1)]);
        assert_eq!(ancestor.timestamp(), t1);
        let rev = ancestor.get(&ObjectId::new("concept", "1")).unwrap().unwrap();
        assert_eq!(rev.properties["v"], json!(1));
    }
}
