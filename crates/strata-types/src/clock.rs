use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::branch_point::Timestamp;

/// Strictly monotonic millisecond clock for commit points.
///
/// Follows the local-event rule of a hybrid logical clock with the logical
/// counter folded into the millisecond: `next = max(wall_clock, last + 1)`.
/// Two commits never share a timestamp, even when issued in the same
/// millisecond or after the wall clock steps backwards.
#[derive(Debug)]
pub struct TimestampSource {
    last: Mutex<Timestamp>,
}

impl TimestampSource {
    /// Create a clock that has issued nothing yet.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(0),
        }
    }

    /// Generate a timestamp strictly greater than any previously returned.
    pub fn next(&self) -> Timestamp {
        let wall = Self::wall_clock_ms();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = wall.max(*last + 1);
        *last = next;
        next
    }

    /// Make sure every future timestamp is strictly after `seen`.
    ///
    /// Used when adopting branch heads created by another clock.
    pub fn observe(&self, seen: Timestamp) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if seen > *last {
            *last = seen;
        }
    }

    /// The most recently issued (or observed) timestamp.
    pub fn last(&self) -> Timestamp {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wall_clock_ms() -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

impl Default for TimestampSource {
    fn default() -> Self {
        Self::new()
    }
}
