use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use crate::crdt::field_clock::FieldClock;

/// Issue lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Progress,
    Review,
    Complete,
    Archived,
    Closed,
    Deleted,
}

impl Status {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Progress => "progress",
            Self::Review => "review",
            Self::Complete => "complete",
            Self::Archived => "archived",
            Self::Closed => "closed",
            Self::Deleted => "deleted",
        }
    }

    /// Terminal statuses are hidden from default listings.
    ///
    /// This has no bearing on merge: a terminal status is an ordinary
    /// clocked value.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Archived | Self::Closed | Self::Deleted
        )
    }
}

/// The kind of work an issue represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Task,
    Bug,
    Chore,
    Feature,
    Idea,
    Verify,
}

impl IssueType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Bug => "bug",
            Self::Chore => "chore",
            Self::Feature => "feature",
            Self::Idea => "idea",
            Self::Verify => "verify",
        }
    }
}

/// How an issue's children are meant to be worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Series,
    Parallel,
}

impl ExecutionMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Parallel => "parallel",
        }
    }
}

/// One parent edge of an issue, with its position among the parent's children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub parent_issue: String,
    /// Opaque lexicographic key; see [`crate::sort_order`].
    pub sort_order: String,
}

impl ParentRef {
    pub fn new(parent_issue: impl Into<String>, sort_order: impl Into<String>) -> Self {
        Self {
            parent_issue: parent_issue.into(),
            sort_order: sort_order.into(),
        }
    }
}

/// A tracked issue as stored, one per line, in `.fleece/issues.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub title: FieldClock<String>,
    pub status: FieldClock<Status>,
    #[serde(rename = "type")]
    pub issue_type: FieldClock<IssueType>,
    pub assigned_to: FieldClock<Option<String>>,
    #[serde(rename = "linkedPR")]
    pub linked_pr: FieldClock<Option<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub linked_issues: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_issues: Vec<ParentRef>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl Issue {
    /// Create an open issue whose every clock starts at the creation instant.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        issue_type: IssueType,
        at: DateTime<Utc>,
        actor: &str,
    ) -> Self {
        Self {
            id: id.into(),
            title: FieldClock::new(title.into(), at, actor),
            status: FieldClock::new(Status::Open, at, actor),
            issue_type: FieldClock::new(issue_type, at, actor),
            assigned_to: FieldClock::new(None, at, actor),
            linked_pr: FieldClock::new(None, at, actor),
            description: None,
            priority: None,
            execution_mode: None,
            tags: BTreeSet::new(),
            linked_issues: BTreeSet::new(),
            parent_issues: Vec::new(),
            created_at: at,
            created_by: actor.to_string(),
        }
    }

    /// Whole-record last update: the latest of all field clocks.
    #[must_use]
    pub fn last_update(&self) -> DateTime<Utc> {
        [
            self.title.last_update,
            self.status.last_update,
            self.issue_type.last_update,
            self.assigned_to.last_update,
            self.linked_pr.last_update,
        ]
        .into_iter()
        .fold(self.created_at, std::cmp::max)
    }

    pub fn parent_ids(&self) -> impl Iterator<Item = &str> {
        self.parent_issues.iter().map(|p| p.parent_issue.as_str())
    }

    #[must_use]
    pub fn has_parent(&self, parent_id: &str) -> bool {
        self.parent_ids().any(|id| id == parent_id)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.value.is_terminal()
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "open" => Ok(Self::Open),
            "progress" | "in-progress" => Ok(Self::Progress),
            "review" => Ok(Self::Review),
            "complete" | "done" => Ok(Self::Complete),
            "archived" => Ok(Self::Archived),
            "closed" => Ok(Self::Closed),
            "deleted" => Ok(Self::Deleted),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for IssueType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "task" => Ok(Self::Task),
            "bug" => Ok(Self::Bug),
            "chore" => Ok(Self::Chore),
            "feature" => Ok(Self::Feature),
            "idea" => Ok(Self::Idea),
            "verify" => Ok(Self::Verify),
            _ => Err(ParseEnumError {
                expected: "type",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "series" => Ok(Self::Series),
            "parallel" => Ok(Self::Parallel),
            _ => Err(ParseEnumError {
                expected: "execution mode",
                got: s.to_string(),
            }),
        }
    }
}
