use serde::Serialize;
use thiserror::Error;

use crate::crdt::MergeStats;
use crate::error::{ErrorCode, FleeceError};

/// How a sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing owned to publish and nothing to pull.
    UpToDate,
    /// Local issue changes committed and pushed.
    Pushed,
    /// Remote commits fast-forwarded; no local issue changes.
    FastForwarded,
    /// Local and remote issue logs merged, committed and pushed.
    Merged,
    Failed,
}

/// Why a sync run failed. Failures before the commit leave the working copy
/// as it was. `PushRejected` and `PushFailed` happen after it, so the tree is
/// clean with the issue commit in place.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncFailure {
    #[error("checked-out branch is '{current}', not '{expected}'")]
    WrongBranch { expected: String, current: String },

    #[error("no working copy has branch '{branch}' checked out")]
    WorktreeNotFound { branch: String },

    #[error("git fetch failed: {stderr}")]
    FetchFailed { stderr: String },

    #[error("uncommitted changes outside .fleece: {}", files.join(", "))]
    ForeignChangesBlocking { files: Vec<String> },

    #[error("cannot fast-forward to {upstream}: {stderr}")]
    FastForwardFailed { upstream: String, stderr: String },

    #[error("push rejected; remote has commits that must be pulled first")]
    PushRejected { stderr: String },

    #[error("git push failed: {stderr}")]
    PushFailed { stderr: String },

    #[error("git {command} failed: {stderr}")]
    GitCommandFailed { command: String, stderr: String },

    #[error("{message}")]
    Store {
        #[serde(skip)]
        code: ErrorCode,
        message: String,
    },
}

impl SyncFailure {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::WrongBranch { .. } => ErrorCode::WrongBranch,
            Self::WorktreeNotFound { .. } => ErrorCode::WorktreeNotFound,
            Self::FetchFailed { .. } => ErrorCode::FetchFailed,
            Self::ForeignChangesBlocking { .. } => ErrorCode::ForeignChangesBlocking,
            Self::FastForwardFailed { .. } => ErrorCode::FastForwardFailed,
            Self::PushRejected { .. } => ErrorCode::PushRejected,
            Self::PushFailed { .. } => ErrorCode::PushFailed,
            Self::GitCommandFailed { .. } => ErrorCode::GitCommandFailed,
            Self::Store { code, .. } => *code,
        }
    }

    #[must_use]
    pub const fn requires_pull_first(&self) -> bool {
        matches!(self, Self::PushRejected { .. })
    }
}

impl From<FleeceError> for SyncFailure {
    fn from(err: FleeceError) -> Self {
        match err {
            FleeceError::GitSpawn { command, source } => Self::GitCommandFailed {
                command,
                stderr: source.to_string(),
            },
            other => Self::Store {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

/// Read-only view of a working copy relative to its upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchStatus {
    pub branch: String,
    pub upstream: String,
    /// `false` when the upstream ref does not exist yet.
    pub upstream_exists: bool,
    pub ahead: u32,
    pub behind: u32,
    pub owned_files: Vec<String>,
    pub foreign_files: Vec<String>,
}

impl BranchStatus {
    #[must_use]
    pub fn has_owned_changes(&self) -> bool {
        !self.owned_files.is_empty()
    }

    #[must_use]
    pub fn has_foreign_changes(&self) -> bool {
        !self.foreign_files.is_empty()
    }
}

/// Structured report of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub branch: String,
    pub outcome: SyncOutcome,
    pub ahead: u32,
    pub behind: u32,
    pub has_foreign_changes: bool,
    pub foreign_files: Vec<String>,
    pub requires_pull_first: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_stats: Option<MergeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncFailure>,
}

impl SyncResult {
    pub(crate) fn started(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            outcome: SyncOutcome::Failed,
            ahead: 0,
            behind: 0,
            has_foreign_changes: false,
            foreign_files: Vec::new(),
            requires_pull_first: false,
            message: String::new(),
            merge_stats: None,
            error_code: None,
            error: None,
        }
    }

    pub(crate) fn succeed(mut self, outcome: SyncOutcome, message: impl Into<String>) -> Self {
        self.outcome = outcome;
        self.message = message.into();
        self
    }

    pub(crate) fn fail(mut self, failure: SyncFailure) -> Self {
        if let SyncFailure::ForeignChangesBlocking { files } = &failure {
            self.has_foreign_changes = true;
            self.foreign_files.clone_from(files);
        }
        self.outcome = SyncOutcome::Failed;
        self.requires_pull_first = failure.requires_pull_first();
        self.message = failure.to_string();
        self.error_code = Some(failure.code().code());
        self.error = Some(failure);
        self
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.outcome, SyncOutcome::Failed)
    }
}
