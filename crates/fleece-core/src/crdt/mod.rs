//! Conflict-free merge primitives for issue records.

pub mod field_clock;
pub mod merge;

pub use field_clock::FieldClock;
pub use merge::{MergeStats, SnapshotMerge, merge_issue, merge_snapshots};
