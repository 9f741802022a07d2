//! Parent/child hierarchy over a project's issues.
//!
//! Every issue lists its parents in `parent_issues`; across a project those
//! edges must form a DAG. This module answers hierarchy questions over an
//! in-memory snapshot and computes parent changes without performing them:
//!
//! - Would making `parent` a parent of `child` close a cycle?
//! - What does the child look like after a set/add/remove of a parent?
//! - Does the snapshot already contain a cycle (e.g. after two replicas
//!   re-parented concurrently and their parent lists were unioned)?
//!
//! # Cycle prevention
//!
//! `would_create_cycle` walks `parent_issues` upward from the candidate
//! parent with a visited set. If the walk reaches the candidate child, the
//! child is already an ancestor of the parent and the new edge would close
//! a loop. The visited set keeps the walk finite even if a cycle is
//! already present. O(V+E).

#![allow(clippy::must_use_candidate, clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{FleeceError, Result};
use crate::model::{Issue, ParentRef};
use crate::sort_order;

// ---------------------------------------------------------------------------
// IssueGraph
// ---------------------------------------------------------------------------

/// Read-only view of the parent edges of a set of issues.
#[derive(Debug, Clone, Default)]
pub struct IssueGraph<'a> {
    parents: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> IssueGraph<'a> {
    pub fn from_issues(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        let parents = issues
            .into_iter()
            .map(|issue| (issue.id.as_str(), issue.parent_ids().collect()))
            .collect();
        Self { parents }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    pub fn parents_of(&self, id: &str) -> &[&'a str] {
        self.parents.get(id).map_or(&[], Vec::as_slice)
    }

    /// All (transitive) ancestors of `id`, excluding `id` itself unless it
    /// sits on a cycle.
    pub fn ancestors(&self, id: &str) -> HashSet<&'a str> {
        let mut seen: HashSet<&'a str> = HashSet::new();
        let mut queue: VecDeque<&'a str> = self.parents_of(id).iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            queue.extend(self.parents_of(current).iter().copied());
        }

        seen
    }

    /// Returns `true` if adding the edge `candidate_child → candidate_parent`
    /// would make an issue its own ancestor.
    pub fn would_create_cycle(&self, candidate_parent: &str, candidate_child: &str) -> bool {
        if candidate_parent == candidate_child {
            return true;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![candidate_parent];

        while let Some(current) = stack.pop() {
            if current == candidate_child {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.parents_of(current).iter().copied());
        }

        false
    }

    /// Find one cycle in the graph, if any, as a path that starts and ends
    /// on the same issue.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut color: HashMap<&str, Color> = HashMap::new();
        let mut ids: Vec<&str> = self.parents.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            if color.get(id).copied().unwrap_or(Color::White) == Color::White {
                let mut path = Vec::new();
                if let Some(cycle) = self.dfs_cycle(id, &mut color, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &'a str,
        color: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        color.insert(node, Color::Gray);
        path.push(node);

        for &parent in self.parents_of(node) {
            match color.get(parent).copied().unwrap_or(Color::White) {
                Color::White => {
                    if let Some(cycle) = self.dfs_cycle(parent, color, path) {
                        return Some(cycle);
                    }
                }
                Color::Gray => {
                    let start = path.iter().position(|id| *id == parent).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|id| (*id).to_string()).collect();
                    cycle.push(parent.to_string());
                    return Some(cycle);
                }
                Color::Black => {}
            }
        }

        path.pop();
        color.insert(node, Color::Black);
        None
    }
}

/// DFS colors for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

// ---------------------------------------------------------------------------
// Parent changes
// ---------------------------------------------------------------------------

/// How a parent assignment treats the child's existing parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentChange {
    /// Make `parent` the only parent (`replace_existing = true`) or append it.
    Set { replace_existing: bool },
    /// Append `parent`, keeping existing parents.
    Add,
    /// Drop `parent` if present.
    Remove,
}

/// Compute the child issue after a parent change, without mutating anything.
///
/// Fails with [`FleeceError::IssueNotFound`] if either id is unknown and
/// with [`FleeceError::CycleDetected`] if the new edge would close a loop.
/// Removal is never cycle-checked since dropping an edge cannot create one.
/// All fields other than `parent_issues` are preserved.
pub fn plan_parent_change(
    issues: &HashMap<String, Issue>,
    child_id: &str,
    parent_id: &str,
    change: ParentChange,
) -> Result<Issue> {
    let child = issues
        .get(child_id)
        .ok_or_else(|| FleeceError::IssueNotFound(child_id.to_string()))?;

    if change == ParentChange::Remove {
        let mut updated = child.clone();
        updated.parent_issues.retain(|p| p.parent_issue != parent_id);
        return Ok(updated);
    }

    if !issues.contains_key(parent_id) {
        return Err(FleeceError::IssueNotFound(parent_id.to_string()));
    }

    let graph = IssueGraph::from_issues(issues.values());
    if graph.would_create_cycle(parent_id, child_id) {
        return Err(FleeceError::CycleDetected {
            parent: parent_id.to_string(),
            child: child_id.to_string(),
        });
    }

    let mut updated = child.clone();
    let replace = matches!(change, ParentChange::Set { replace_existing: true });
    if replace {
        updated.parent_issues.retain(|p| p.parent_issue == parent_id);
    }
    if !updated.has_parent(parent_id) {
        let last = last_child_sort_order(issues, parent_id);
        updated.parent_issues.push(ParentRef::new(
            parent_id,
            sort_order::key_after(last.as_deref()),
        ));
    }

    Ok(updated)
}

/// Highest sort order among the current children of `parent_id`.
fn last_child_sort_order(issues: &HashMap<String, Issue>, parent_id: &str) -> Option<String> {
    issues
        .values()
        .flat_map(|issue| issue.parent_issues.iter())
        .filter(|p| p.parent_issue == parent_id)
        .map(|p| p.sort_order.as_str())
        .max()
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
