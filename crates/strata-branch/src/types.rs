//! Core branch types.
//!
//! A branch is a logical view over the shared document space, described by
//! an ordered list of [`Segment`]s. Each segment contributes the revisions one
//! physical branch id wrote inside a time window. A child branch starts as a
//! copy of its parent's segments truncated at the parent's head plus one
//! segment of its own.

use serde::{Deserialize, Serialize};
use strata_types::{BranchId, BranchPoint, Timestamp, MAIN_BRANCH_ID};

/// Path of the root branch.
pub const MAIN: &str = "MAIN";

/// Separator between branch path components.
pub const PATH_SEPARATOR: char = '/';

/// A time window `[from, to]` (inclusive) on one physical branch id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    /// Physical branch id whose writes this segment contributes.
    pub branch_id: BranchId,
    /// First timestamp covered.
    pub from: Timestamp,
    /// Last timestamp covered.
    pub to: Timestamp,
}

impl Segment {
    /// Create a new segment.
    pub const fn new(branch_id: BranchId, from: Timestamp, to: Timestamp) -> Self {
        Self { branch_id, from, to }
    }

    /// Lower bound as a branch point.
    pub fn start(&self) -> BranchPoint {
        BranchPoint::new(self.branch_id, self.from)
    }

    /// Upper bound as a branch point.
    pub fn end(&self) -> BranchPoint {
        BranchPoint::new(self.branch_id, self.to)
    }

    /// Returns `true` if `point` falls inside this segment.
    pub fn contains(&self, point: BranchPoint) -> bool {
        point.branch_id == self.branch_id && self.from <= point.timestamp && point.timestamp <= self.to
    }

    /// Cut the segment off at `ts`. Returns `None` if it starts after `ts`.
    pub fn truncate(&self, ts: Timestamp) -> Option<Segment> {
        (self.from <= ts).then(|| Segment::new(self.branch_id, self.from, self.to.min(ts)))
    }
}

/// A record that `source` was merged into a branch up to `timestamp`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSource {
    /// Path of the merged branch.
    pub source_path: String,
    /// Physical id the source had at merge time.
    pub source_branch_id: BranchId,
    /// Source head that was merged.
    pub source_timestamp: Timestamp,
    /// Target commit that recorded the merge.
    pub target_timestamp: Timestamp,
}

/// A branch: a named, versioned view over the document space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Full path, e.g. `MAIN/feature/a`.
    pub path: String,
    /// Current physical id. Changes when the branch is reopened.
    pub branch_id: BranchId,
    /// Path of the parent, `None` for `MAIN`.
    pub parent_path: Option<String>,
    /// Parent head the current segments were derived from.
    pub base_timestamp: Timestamp,
    /// Timestamp of the latest commit.
    pub head_timestamp: Timestamp,
    /// Contributing segments, oldest contributor first. The last one is the
    /// branch's own segment and ends at the head.
    pub segments: Vec<Segment>,
    /// Merges received from other branches, oldest first.
    pub merge_sources: Vec<MergeSource>,
}

impl Branch {
    /// The root branch in its initial state.
    pub fn main() -> Self {
        Self {
            path: MAIN.to_string(),
            branch_id: MAIN_BRANCH_ID,
            parent_path: None,
            base_timestamp: 0,
            head_timestamp: 0,
            segments: vec![Segment::new(MAIN_BRANCH_ID, 0, 0)],
            merge_sources: Vec::new(),
        }
    }

    /// Derive a child of `parent` at the parent's current head.
    pub fn child_of(parent: &Branch, name: &str, branch_id: BranchId) -> Self {
        let base = parent.head_timestamp;
        let mut segments = truncate_segments(&parent.segments, base);
        segments.push(Segment::new(branch_id, base, base));
        Self {
            path: child_path(&parent.path, name),
            branch_id,
            parent_path: Some(parent.path.clone()),
            base_timestamp: base,
            head_timestamp: base,
            segments,
            merge_sources: Vec::new(),
        }
    }

    /// Returns `true` for the root branch.
    pub fn is_main(&self) -> bool {
        self.parent_path.is_none()
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.path.rsplit(PATH_SEPARATOR).next().unwrap_or(&self.path)
    }

    /// The branch point of a commit on this branch at `ts`.
    pub fn point(&self, ts: Timestamp) -> BranchPoint {
        BranchPoint::new(self.branch_id, ts)
    }

    /// The head as a branch point.
    pub fn head(&self) -> BranchPoint {
        self.point(self.head_timestamp)
    }

    /// Segments as they were at `ts` (time travel).
    pub fn segments_at(&self, ts: Timestamp) -> Vec<Segment> {
        truncate_segments(&self.segments, ts.min(self.head_timestamp))
    }

    /// Move the head forward, extending the own segment.
    pub fn advance(&mut self, ts: Timestamp) {
        if ts <= self.head_timestamp {
            return;
        }
        self.head_timestamp = ts;
        if let Some(own) = self.segments.last_mut() {
            if own.branch_id == self.branch_id {
                own.to = ts;
            }
        }
    }

    /// The most recent merge received from the branch with physical id `source_branch_id`.
    pub fn last_merge_from(&self, source_branch_id: BranchId) -> Option<&MergeSource> {
        self.merge_sources
            .iter()
            .rev()
            .find(|m| m.source_branch_id == source_branch_id)
    }
}

/// Path of a child named `name` under `parent`.
pub fn child_path(parent: &str, name: &str) -> String {
    format!("{parent}{PATH_SEPARATOR}{name}")
}

/// Cut every segment off at `ts`, dropping those that start after it.
pub fn truncate_segments(segments: &[Segment], ts: Timestamp) -> Vec<Segment> {
    segments.iter().filter_map(|s| s.truncate(ts)).collect()
}

/// Longest shared prefix of two segment lists.
///
/// Segments are compared pairwise; on the first pair that covers the same
/// branch but ends at different times, the shorter window is kept and the
/// scan stops.
pub fn common_prefix(a: &[Segment], b: &[Segment]) -> Vec<Segment> {
    let mut prefix = Vec::new();
    for (x, y) in a.iter().zip(b) {
        if x.branch_id != y.branch_id || x.from != y.from {
            break;
        }
        prefix.push(Segment::new(x.branch_id, x.from, x.to.min(y.to)));
        if x.to != y.to {
            break;
        }
    }
    prefix
}

/// The parts of `segments` not covered by `ancestor`.
///
/// Each segment of `segments` is reduced by the window its branch id has in
/// `ancestor`; ancestor windows always start at the branch's first timestamp,
/// so the remainder is a single window after the ancestor's end.
pub fn segments_beyond(segments: &[Segment], ancestor: &[Segment]) -> Vec<Segment> {
    segments
        .iter()
        .filter_map(|s| match ancestor.iter().find(|a| a.branch_id == s.branch_id) {
            None => Some(*s),
            Some(a) if a.to >= s.to => None,
            Some(a) => Some(Segment::new(s.branch_id, s.from.max(a.to.saturating_add(1)), s.to)),
        })
        .collect()
}

/// Returns `true` if `prefix` is a (possibly truncated) prefix of `segments`
/// that covers at least as much as `other`.
pub fn covers(prefix: &[Segment], other: &[Segment]) -> bool {
    if prefix.len() != other.len() {
        return prefix.len() > other.len();
    }
    match (prefix.last(), other.last()) {
        (Some(p), Some(o)) => p.to >= o.to,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_starts_empty() {
        let main = Branch::main();
        assert!(main.is_main());
        assert_eq!(main.name(), "MAIN");
        assert_eq!(main.segments, vec![Segment::new(0, 0, 0)]);
    }

    #[test]
    fn child_inherits_truncated_parent_segments() {
        let mut main = Branch::main();
        main.advance(100);
        let child = Branch::child_of(&main, "x", 7);
        assert_eq!(child.path, "MAIN/x");
        assert_eq!(child.name(), "x");
        assert_eq!(child.base_timestamp, 100);
        assert_eq!(
            child.segments,
            vec![Segment::new(0, 0, 100), Segment::new(7, 100, 100)]
        );

        main.advance(200);
        assert_eq!(child.segments[0].to, 100, "child view is pinned at base");
    }

    #[test]
    fn advance_extends_own_segment_only_forward() {
        let mut main = Branch::main();
        main.advance(50);
        main.advance(10);
        assert_eq!(main.head_timestamp, 50);
        assert_eq!(main.segments.last().unwrap().to, 50);
    }

    #[test]
    fn segments_at_time_travels() {
        let mut main = Branch::main();
        main.advance(100);
        let mut child = Branch::child_of(&main, "x", 1);
        child.advance(300);

        assert_eq!(
            child.segments_at(50),
            vec![Segment::new(0, 0, 50)],
            "before the branch existed only the parent is visible"
        );
        assert_eq!(
            child.segments_at(200),
            vec![Segment::new(0, 0, 100), Segment::new(1, 100, 200)]
        );
        assert_eq!(child.segments_at(u64::MAX), child.segments);
    }

    #[test]
    fn common_prefix_of_parent_and_child() {
        let parent = vec![Segment::new(0, 0, 500)];
        let child = vec![Segment::new(0, 0, 100), Segment::new(3, 100, 400)];
        assert_eq!(common_prefix(&parent, &child), vec![Segment::new(0, 0, 100)]);
    }

    #[test]
    fn common_prefix_of_siblings() {
        let a = vec![Segment::new(0, 0, 100), Segment::new(1, 100, 150)];
        let b = vec![Segment::new(0, 0, 200), Segment::new(2, 200, 250)];
        assert_eq!(common_prefix(&a, &b), vec![Segment::new(0, 0, 100)]);
    }

    #[test]
    fn common_prefix_of_identical_views() {
        let a = vec![Segment::new(0, 0, 100), Segment::new(1, 100, 150)];
        assert_eq!(common_prefix(&a, &a), a);
    }

    #[test]
    fn beyond_subtracts_ancestor_windows() {
        let ancestor = vec![Segment::new(0, 0, 100)];
        let parent = vec![Segment::new(0, 0, 500)];
        let child = vec![Segment::new(0, 0, 100), Segment::new(3, 100, 400)];
        assert_eq!(segments_beyond(&parent, &ancestor), vec![Segment::new(0, 101, 500)]);
        assert_eq!(segments_beyond(&child, &ancestor), vec![Segment::new(3, 100, 400)]);
        assert!(segments_beyond(&ancestor, &ancestor).is_empty());
    }

    #[test]
    fn covers_prefers_longer_prefix() {
        let short = vec![Segment::new(0, 0, 100)];
        let long = vec![Segment::new(0, 0, 100), Segment::new(1, 100, 120)];
        let later = vec![Segment::new(0, 0, 150)];
        assert!(covers(&long, &short));
        assert!(!covers(&short, &long));
        assert!(covers(&later, &short));
        assert!(!covers(&short, &later));
    }

    #[test]
    fn last_merge_from_finds_latest() {
        let mut main = Branch::main();
        for (src, tgt) in [(10, 11), (20, 21)] {
            main.merge_sources.push(MergeSource {
                source_path: "MAIN/x".into(),
                source_branch_id: 4,
                source_timestamp: src,
                target_timestamp: tgt,
            });
        }
        assert_eq!(main.last_merge_from(4).unwrap().source_timestamp, 20);
        assert!(main.last_merge_from(5).is_none());
    }
}
