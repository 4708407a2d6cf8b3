//! Branch references and revision visibility filters.
//!
//! Visibility is expressed entirely in the storage filter algebra. A revision
//! is visible through a segment list when its `created` point falls inside
//! one of the segments and none of its `revised` points does:
//!
//! ```text
//! OR(created in seg_i) AND NOT OR(revised in seg_i)
//! ```

use std::fmt;
use std::str::FromStr;

use strata_branch::{Branch, BranchManager, Segment};
use strata_store::Expression;
use strata_types::{BranchPoint, Timestamp, MAX_TIMESTAMP};

use crate::error::{RevisionError, RevisionResult};
use crate::revision::{FIELD_CREATED, FIELD_REVISED};

/// Separator between a branch path and a pinned timestamp.
pub const TIMESTAMP_SEPARATOR: char = '@';

/// A branch path, optionally pinned to a timestamp (`MAIN/x@1700000000000`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BranchRef {
    pub path: String,
    pub timestamp: Option<Timestamp>,
}

impl BranchRef {
    /// Reference the head of `path`.
    pub fn head(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            timestamp: None,
        }
    }

    /// Reference `path` as it was at `ts`.
    pub fn at(path: impl Into<String>, ts: Timestamp) -> Self {
        Self {
            path: path.into(),
            timestamp: Some(ts),
        }
    }

    /// Parse `path` or `path@timestamp`.
    pub fn parse(s: &str) -> RevisionResult<Self> {
        match s.split_once(TIMESTAMP_SEPARATOR) {
            None if !s.is_empty() => Ok(Self::head(s)),
            Some((path, ts)) if !path.is_empty() => ts
                .parse::<Timestamp>()
                .map(|ts| Self::at(path, ts))
                .map_err(|_| RevisionError::InvalidBranchRef(s.to_string())),
            _ => Err(RevisionError::InvalidBranchRef(s.to_string())),
        }
    }

    /// Resolve against the branch registry.
    pub fn resolve(&self, branches: &dyn BranchManager) -> RevisionResult<ResolvedRef> {
        let branch = branches.get_branch(&self.path)?;
        Ok(ResolvedRef::new(branch, self.timestamp))
    }
}

impl FromStr for BranchRef {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "{}{TIMESTAMP_SEPARATOR}{ts}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

/// A branch snapshot plus the segments visible at the referenced time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRef {
    pub branch: Branch,
    pub segments: Vec<Segment>,
    pub timestamp: Timestamp,
}

impl ResolvedRef {
    /// View of `branch` at `timestamp`, or at its head.
    pub fn new(branch: Branch, timestamp: Option<Timestamp>) -> Self {
        let timestamp = timestamp.map_or(branch.head_timestamp, |ts| ts.min(branch.head_timestamp));
        let segments = branch.segments_at(timestamp);
        Self {
            branch,
            segments,
            timestamp,
        }
    }

    /// The visibility filter for this view.
    pub fn filter(&self) -> Expression {
        visible(&self.segments)
    }
}

fn range_of(field: &str, segment: &Segment) -> Expression {
    Expression::range(field, segment.start().encode(), segment.end().encode())
}

/// Revisions created inside any of `segments`.
pub fn created_in(segments: &[Segment]) -> Expression {
    Expression::or(segments.iter().map(|s| range_of(FIELD_CREATED, s)))
}

/// Revisions superseded inside any of `segments`.
pub fn revised_in(segments: &[Segment]) -> Expression {
    Expression::or(segments.iter().map(|s| range_of(FIELD_REVISED, s)))
}

/// Revisions visible through `segments`.
pub fn visible(segments: &[Segment]) -> Expression {
    Expression::and([created_in(segments), Expression::not(revised_in(segments))])
}

/// Visibility with `branch`'s own segment unbounded above.
///
/// Used to age out superseded revisions at commit time: revisions another
/// writer committed on the same branch after this writer's snapshot then
/// change the matched row set, which storage reports as a version conflict.
pub fn visible_open_ended(branch: &Branch) -> Expression {
    visible(&open_ended_segments(branch))
}

/// `branch`'s segments with its own segment extended to [`MAX_TIMESTAMP`].
pub fn open_ended_segments(branch: &Branch) -> Vec<Segment> {
    branch
        .segments
        .iter()
        .map(|s| {
            if s.branch_id == branch.branch_id {
                Segment::new(s.branch_id, s.from, MAX_TIMESTAMP)
            } else {
                *s
            }
        })
        .collect()
}

/// Revisions created or superseded inside any of `ranges`.
pub fn touched_in(ranges: &[Segment]) -> Expression {
    Expression::or([created_in(ranges), revised_in(ranges)])
}

/// Revisions created or superseded exactly at `point`.
pub fn touched_at(point: BranchPoint) -> Expression {
    let encoded = point.encode();
    Expression::or([
        Expression::exact_match(FIELD_CREATED, encoded.clone()),
        Expression::exact_match(FIELD_REVISED, encoded),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use strata_types::ObjectId;

    use crate::revision::Revision;

    fn row(created: BranchPoint, revised: &[BranchPoint]) -> Map<String, Value> {
        let mut r = Revision::new(ObjectId::new("concept", "1"), created, None, Map::new());
        r.revised = revised.to_vec();
        r.to_document().source
    }

    fn main_at(head: Timestamp) -> Branch {
        let mut b = Branch::main();
        b.advance(head);
        b
    }

    #[test]
    fn parse_branch_refs() {
        assert_eq!(BranchRef::parse("MAIN").unwrap(), BranchRef::head("MAIN"));
        assert_eq!(BranchRef::parse("MAIN/x@42").unwrap(), BranchRef::at("MAIN/x", 42));
        assert!(BranchRef::parse("MAIN@soon").is_err());
        assert!(BranchRef::parse("@5").is_err());
        assert!(BranchRef::parse("").is_err());
        assert_eq!(BranchRef::at("MAIN", 7).to_string(), "MAIN@7");
        assert_eq!("MAIN".parse::<BranchRef>().unwrap().to_string(), "MAIN");
    }

    #[test]
    fn live_revision_is_visible() {
        let main = main_at(100);
        let f = visible(&main.segments);
        assert!(f.matches(&row(BranchPoint::new(0, 50), &[])));
        assert!(!f.matches(&row(BranchPoint::new(0, 150), &[])), "after head");
    }

    #[test]
    fn superseded_revision_is_hidden_from_the_superseding_point() {
        let r = row(BranchPoint::new(0, 50), &[BranchPoint::new(0, 80)]);
        assert!(visible(&main_at(79).segments).matches(&r));
        assert!(!visible(&main_at(80).segments).matches(&r));
    }

    #[test]
    fn child_sees_parent_up_to_base_only() {
        let main = main_at(100);
        let mut child = Branch::child_of(&main, "x", 1);
        child.advance(300);
        let f = visible(&child.segments);

        assert!(f.matches(&row(BranchPoint::new(0, 90), &[])));
        assert!(!f.matches(&row(BranchPoint::new(0, 110), &[])));
        assert!(f.matches(&row(BranchPoint::new(1, 200), &[])));
        // Superseded on MAIN after the child branched off: still visible on the child.
        assert!(f.matches(&row(BranchPoint::new(0, 90), &[BranchPoint::new(0, 150)])));
        // Superseded on the child: hidden on the child, still visible on MAIN.
        let r = row(BranchPoint::new(0, 90), &[BranchPoint::new(1, 200)]);
        assert!(!f.matches(&r));
        assert!(visible(&main_at(400).segments).matches(&r));
    }

    #[test]
    fn time_travel_truncates_segments() {
        let main = main_at(100);
        let resolved = ResolvedRef::new(main, Some(60));
        assert_eq!(resolved.timestamp, 60);
        assert!(resolved.filter().matches(&row(BranchPoint::new(0, 50), &[BranchPoint::new(0, 70)])));
        assert!(!resolved.filter().matches(&row(BranchPoint::new(0, 70), &[])));
    }

    #[test]
    fn pinning_past_head_clamps_to_head() {
        let resolved = ResolvedRef::new(main_at(100), Some(500));
        assert_eq!(resolved.timestamp, 100);
    }

    #[test]
    fn open_ended_filter_sees_later_rows_on_own_branch() {
        let main = main_at(100);
        let later = row(BranchPoint::new(0, 150), &[]);
        assert!(!visible(&main.segments).matches(&later));
        assert!(visible_open_ended(&main).matches(&later));
    }

    #[test]
    fn touched_filters() {
        let ranges = [Segment::new(2, 10, 20)];
        assert!(touched_in(&ranges).matches(&row(BranchPoint::new(2, 15), &[])));
        assert!(touched_in(&ranges).matches(&row(BranchPoint::new(0, 5), &[BranchPoint::new(2, 20)])));
        assert!(!touched_in(&ranges).matches(&row(BranchPoint::new(2, 21), &[])));

        let at = touched_at(BranchPoint::new(2, 15));
        assert!(at.matches(&row(BranchPoint::new(2, 15), &[])));
        assert!(at.matches(&row(BranchPoint::new(0, 1), &[BranchPoint::new(2, 15)])));
        assert!(!at.matches(&row(BranchPoint::new(2, 16), &[])));
    }
}
