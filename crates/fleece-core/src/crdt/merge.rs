//! Field-level merge of issue snapshots.
//!
//! This is the semantic merge used by the sync engine in place of a
//! textual git merge of `.fleece/issues.jsonl`. Two replicas that edited
//! different issues, or different fields of the same issue, always
//! converge without conflict.
//!
//! # Merge Semantics
//!
//! For one issue present on both sides ([`merge_issue`]):
//!
//! - **Clocked fields** (title, status, type, assignee, linked PR): the
//!   strictly newer [`FieldClock`] wins; exact ties go to remote.
//! - **Clockless scalars** (description, priority, execution mode): these
//!   are set at creation, so local is kept unless it is unset, in which
//!   case remote fills the gap.
//! - **Sets** (tags, linked issues): union.
//! - **Parents**: union keyed by parent id. When both sides carry the same
//!   parent with different sort orders, the side whose whole-record
//!   [`Issue::last_update`] is later supplies it (ties go to remote).
//! - **Creation metadata**: immutable; local is kept.
//!
//! Deletion is a status value like any other; a newer `Deleted` beats an
//! older edit and a newer edit beats an older `Deleted`.
//!
//! For whole snapshots ([`merge_snapshots`]) the id sets are unioned;
//! issues present on one side pass through unchanged.

use std::collections::{BTreeMap, HashSet};

use crate::crdt::field_clock::FieldClock;
use crate::model::{Issue, ParentRef};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Counters describing what a snapshot merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MergeStats {
    /// Issues that existed only in the remote snapshot.
    pub new_local: usize,
    /// Issues that existed only in the local snapshot.
    pub new_remote: usize,
    /// Issues on both sides that differed and were merged field by field.
    pub merged: usize,
    /// Issues on both sides that were already identical.
    pub identical: usize,
}

/// The result of merging two issue snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotMerge {
    /// Merged issues, sorted by id.
    pub issues: Vec<Issue>,
    pub stats: MergeStats,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Merge two copies of the same issue, treating `local` as ours and
/// `remote` as theirs.
///
/// Pure function; `local.id` and `remote.id` are expected to match and the
/// local id is kept.
#[must_use]
pub fn merge_issue(local: &Issue, remote: &Issue) -> Issue {
    debug_assert_eq!(local.id, remote.id, "merge_issue called on different ids");

    Issue {
        id: local.id.clone(),
        title: FieldClock::pick_newer(&local.title, &remote.title),
        status: FieldClock::pick_newer(&local.status, &remote.status),
        issue_type: FieldClock::pick_newer(&local.issue_type, &remote.issue_type),
        assigned_to: FieldClock::pick_newer(&local.assigned_to, &remote.assigned_to),
        linked_pr: FieldClock::pick_newer(&local.linked_pr, &remote.linked_pr),
        description: local
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| remote.description.clone()),
        priority: local.priority.or(remote.priority),
        execution_mode: local.execution_mode.or(remote.execution_mode),
        tags: local.tags.union(&remote.tags).cloned().collect(),
        linked_issues: local
            .linked_issues
            .union(&remote.linked_issues)
            .cloned()
            .collect(),
        parent_issues: merge_parents(local, remote),
        created_at: local.created_at,
        created_by: local.created_by.clone(),
    }
}

/// Merge two whole-project snapshots by id.
///
/// Runs in O(N) merges for N distinct ids across both sides. The output is
/// sorted by id so the written log is stable regardless of input order.
#[must_use]
pub fn merge_snapshots(local: &[Issue], remote: &[Issue]) -> SnapshotMerge {
    let mut by_id: BTreeMap<&str, (Option<&Issue>, Option<&Issue>)> = BTreeMap::new();
    for issue in local {
        by_id.entry(issue.id.as_str()).or_default().0 = Some(issue);
    }
    for issue in remote {
        by_id.entry(issue.id.as_str()).or_default().1 = Some(issue);
    }

    let mut stats = MergeStats::default();
    let mut issues = Vec::with_capacity(by_id.len());

    for (_, sides) in by_id {
        match sides {
            (Some(l), Some(r)) => {
                if l == r {
                    stats.identical += 1;
                    issues.push(r.clone());
                } else {
                    stats.merged += 1;
                    issues.push(merge_issue(l, r));
                }
            }
            (Some(l), None) => {
                stats.new_remote += 1;
                issues.push(l.clone());
            }
            (None, Some(r)) => {
                stats.new_local += 1;
                issues.push(r.clone());
            }
            (None, None) => {}
        }
    }

    SnapshotMerge { issues, stats }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn merge_parents(local: &Issue, remote: &Issue) -> Vec<ParentRef> {
    let remote_wins_order = local.last_update() <= remote.last_update();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged: Vec<ParentRef> = local
        .parent_issues
        .iter()
        .filter(|p| seen.insert(p.parent_issue.as_str()))
        .cloned()
        .collect();

    for parent in &remote.parent_issues {
        match merged
            .iter_mut()
            .find(|p| p.parent_issue == parent.parent_issue)
        {
            Some(existing) => {
                if remote_wins_order {
                    existing.sort_order.clone_from(&parent.sort_order);
                }
            }
            None => merged.push(parent.clone()),
        }
    }

    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
