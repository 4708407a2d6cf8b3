use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Numeric identifier of a branch. Reopening a branch assigns a fresh id.
pub type BranchId = u32;

/// Logical commit time in milliseconds since the UNIX epoch.
pub type Timestamp = u64;

/// The branch id reserved for `MAIN`.
pub const MAIN_BRANCH_ID: BranchId = 0;

/// Sentinel upper bound of a revision that has not been superseded.
pub const MAX_TIMESTAMP: Timestamp = u64::MAX;

/// Width of the hex-encoded branch id in [`BranchPoint::encode`].
const BRANCH_HEX_WIDTH: usize = 8;
/// Width of the hex-encoded timestamp in [`BranchPoint::encode`].
const TIMESTAMP_HEX_WIDTH: usize = 16;

/// A `(branch id, timestamp)` coordinate.
///
/// Branch points are the lower (`created`) and upper-exclusive (`revised`)
/// bounds of a revision's visibility interval.
///
/// Ordering: `timestamp` → `branch_id` (total order). Events on different
/// branches at the same millisecond are ordered deterministically by branch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchPoint {
    /// The branch that owns this point.
    pub branch_id: BranchId,
    /// Milliseconds since UNIX epoch.
    pub timestamp: Timestamp,
}

impl BranchPoint {
    /// Create a new branch point.
    pub const fn new(branch_id: BranchId, timestamp: Timestamp) -> Self {
        Self {
            branch_id,
            timestamp,
        }
    }

    /// The open upper bound `(branch_id, MAX)` of a live revision.
    pub const fn open(branch_id: BranchId) -> Self {
        Self::new(branch_id, MAX_TIMESTAMP)
    }

    /// Returns `true` if this point is the open upper bound sentinel.
    pub fn is_open(&self) -> bool {
        self.timestamp == MAX_TIMESTAMP
    }

    /// Encode as a fixed-width, lexicographically sortable string.
    ///
    /// Points of the same branch sort by timestamp, so a time window on one
    /// branch is a contiguous string range.
    pub fn encode(&self) -> String {
        format!(
            "{:0bw$x}{:0tw$x}",
            self.branch_id,
            self.timestamp,
            bw = BRANCH_HEX_WIDTH,
            tw = TIMESTAMP_HEX_WIDTH
        )
    }

    /// Decode a string produced by [`BranchPoint::encode`].
    pub fn decode(s: &str) -> Result<Self, TypeError> {
        if s.len() != BRANCH_HEX_WIDTH + TIMESTAMP_HEX_WIDTH || !s.is_ascii() {
            return Err(TypeError::InvalidBranchPoint(s.to_string()));
        }
        let (branch, ts) = s.split_at(BRANCH_HEX_WIDTH);
        let branch_id = BranchId::from_str_radix(branch, 16)
            .map_err(|_| TypeError::InvalidBranchPoint(s.to_string()))?;
        let timestamp = Timestamp::from_str_radix(ts, 16)
            .map_err(|_| TypeError::InvalidBranchPoint(s.to_string()))?;
        Ok(Self::new(branch_id, timestamp))
    }
}

impl PartialOrd for BranchPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BranchPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.branch_id.cmp(&other.branch_id))
    }
}

impl fmt::Debug for BranchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BranchPoint({self})")
    }
}

impl fmt::Display for BranchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() {
            write!(f, "{}@MAX", self.branch_id)
        } else {
            write!(f, "{}@{}", self.branch_id, self.timestamp)
        }
    }
}
