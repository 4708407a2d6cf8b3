//! Common ancestors of two branches.

use strata_branch::{common_prefix, covers, truncate_segments, Branch, Segment};
use tracing::debug;

/// The segments both `source` and `target` see.
///
/// Starts from the longest shared segment prefix. A recorded merge between
/// the two current physical branches, in either direction, is a later common
/// state: the merged side as of that merge wins if it covers more.
pub fn common_ancestor(source: &Branch, target: &Branch) -> Vec<Segment> {
    let mut best = common_prefix(&source.segments, &target.segments);
    let candidates = [
        target
            .last_merge_from(source.branch_id)
            .map(|m| (source, m.source_timestamp)),
        source
            .last_merge_from(target.branch_id)
            .map(|m| (target, m.source_timestamp)),
    ];
    for (merged, at) in candidates.into_iter().flatten() {
        let at_merge = truncate_segments(&merged.segments, at);
        if covers(&at_merge, &best) {
            debug!(
                source = %source.path,
                target = %target.path,
                merged = %merged.path,
                merged_at = at,
                "ancestor advanced to previous merge"
            );
            best = at_merge;
        }
    }
    best
}
