//! Per-field Last-Writer-Wins register.
//!
//! Every independently editable issue attribute (title, status, type,
//! assignee, linked PR) is stored as a [`FieldClock<T>`]: the value plus the
//! wall-clock time of its last write and the author of that write. Merging
//! two clocks is a pure comparison of timestamps.
//!
//! # Tie-Breaking
//!
//! Given a `local` and a `remote` clock for the same field:
//!
//! 1. **Timestamp**: the strictly later `last_update` wins.
//! 2. **Exact tie**: the remote side wins.
//!
//! The tie rule is fixed by side, not by content, so a sync that pulls
//! remote state always lands on the remote value when both replicas wrote
//! in the same instant.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// FieldClock
// ---------------------------------------------------------------------------

/// A value paired with the time and author of its most recent write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldClock<T> {
    /// The current value of the field.
    pub value: T,
    /// When this field (and only this field) was last written.
    pub last_update: DateTime<Utc>,
    /// Who wrote the current value.
    pub modified_by: String,
}

impl<T> FieldClock<T> {
    /// Create a clock with the given value and write metadata.
    pub fn new(value: T, last_update: DateTime<Utc>, modified_by: impl Into<String>) -> Self {
        Self {
            value,
            last_update,
            modified_by: modified_by.into(),
        }
    }

    /// Write a new value at `at`.
    ///
    /// The timestamp never moves backwards: when `at` is not after the
    /// current `last_update` (skewed or coarse clock), the write is stamped
    /// one microsecond after the previous one instead.
    pub fn set(&mut self, value: T, at: DateTime<Utc>, author: impl Into<String>) {
        self.last_update = if at > self.last_update {
            at
        } else {
            self.last_update + Duration::microseconds(1)
        };
        self.value = value;
        self.modified_by = author.into();
    }

    /// Returns `true` if `self` was written strictly after `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.last_update > other.last_update
    }
}

impl<T: Clone> FieldClock<T> {
    /// Pick the winning clock between a local and a remote copy.
    ///
    /// Local wins only when strictly newer; ties go to remote.
    #[must_use]
    pub fn pick_newer(local: &Self, remote: &Self) -> Self {
        if local.is_newer_than(remote) {
            local.clone()
        } else {
            remote.clone()
        }
    }

    /// Merge a remote clock into this one, treating `self` as local.
    pub fn merge(&mut self, remote: &Self) {
        if !self.is_newer_than(remote) {
            self.clone_from(remote);
        }
    }
}

impl<T: fmt::Display> fmt::Display for FieldClock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    fn clock(value: &str, secs: i64, author: &str) -> FieldClock<String> {
        FieldClock::new(value.to_string(), ts(secs), author)
    }

    #[test]
    fn later_local_wins() {
        let local = clock("local", 20, "alice");
        let remote = clock("remote", 10, "bob");
        let picked = FieldClock::pick_newer(&local, &remote);
        assert_eq!(picked.value, "local");
        assert_eq!(picked.modified_by, "alice");
    }

    #[test]
    fn later_remote_wins() {
        let local = clock("local", 10, "alice");
        let remote = clock("remote", 20, "bob");
        assert_eq!(FieldClock::pick_newer(&local, &remote).value, "remote");
    }

    #[test]
    fn exact_tie_goes_to_remote() {
        let local = clock("local", 10, "zed");
        let remote = clock("remote", 10, "amy");
        assert_eq!(FieldClock::pick_newer(&local, &remote).value, "remote");

        // Swapping sides swaps the winner: the rule is by side, not content.
        assert_eq!(FieldClock::pick_newer(&remote, &local).value, "local");
    }

    #[test]
    fn merge_in_place_matches_pick_newer() {
        let mut local = clock("local", 10, "alice");
        let remote = clock("remote", 30, "bob");
        local.merge(&remote);
        assert_eq!(local, remote);

        let mut newer = clock("mine", 40, "alice");
        newer.merge(&remote);
        assert_eq!(newer.value, "mine");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = clock("x", 5, "alice");
        let copy = a.clone();
        a.merge(&copy);
        assert_eq!(a, copy);
    }

    #[test]
    fn set_advances_timestamp() {
        let mut c = clock("old", 10, "alice");
        c.set("new".to_string(), ts(15), "bob");
        assert_eq!(c.value, "new");
        assert_eq!(c.last_update, ts(15));
        assert_eq!(c.modified_by, "bob");
    }

    #[test]
    fn set_with_skewed_clock_still_moves_forward() {
        let mut c = clock("old", 10, "alice");
        c.set("new".to_string(), ts(5), "bob");
        assert!(c.last_update > ts(10));

        let before = c.last_update;
        c.set("newer".to_string(), before, "bob");
        assert!(c.last_update > before);
    }

    #[test]
    fn display_shows_value() {
        assert_eq!(clock("hello", 0, "a").to_string(), "hello");
    }
}
