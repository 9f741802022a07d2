use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    IssueNotFound,
    CycleDetected,
    InvalidEnumValue,
    CorruptIssueLog,
    TransientWriteFailure,
    QueueClosed,
    LockContention,
    WrongBranch,
    WorktreeNotFound,
    FetchFailed,
    ForeignChangesBlocking,
    FastForwardFailed,
    PushRejected,
    PushFailed,
    GitCommandFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::IssueNotFound => "E2001",
            Self::CycleDetected => "E2003",
            Self::InvalidEnumValue => "E2005",
            Self::CorruptIssueLog => "E3003",
            Self::TransientWriteFailure => "E5001",
            Self::QueueClosed => "E5003",
            Self::LockContention => "E5002",
            Self::WrongBranch => "E7001",
            Self::WorktreeNotFound => "E7002",
            Self::FetchFailed => "E7003",
            Self::ForeignChangesBlocking => "E7004",
            Self::FastForwardFailed => "E7005",
            Self::PushRejected => "E7006",
            Self::PushFailed => "E7007",
            Self::GitCommandFailed => "E7008",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::IssueNotFound => "Issue not found",
            Self::CycleDetected => "Cycle would be created",
            Self::InvalidEnumValue => "Invalid status/type/mode value",
            Self::CorruptIssueLog => "Corrupt issue log",
            Self::TransientWriteFailure => "Issue log write failed",
            Self::QueueClosed => "Write queue is shut down",
            Self::LockContention => "Lock contention",
            Self::WrongBranch => "Checked-out branch does not match sync target",
            Self::WorktreeNotFound => "No working copy for branch",
            Self::FetchFailed => "git fetch failed",
            Self::ForeignChangesBlocking => "Uncommitted changes outside .fleece block sync",
            Self::FastForwardFailed => "Local and remote history have diverged",
            Self::PushRejected => "Remote advanced during sync",
            Self::PushFailed => "git push failed",
            Self::GitCommandFailed => "git command failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Create an issue with `fleece create` to initialize .fleece/."),
            Self::ConfigParseError => Some("Fix syntax in .fleece/config.toml and retry."),
            Self::IssueNotFound => Some("Run `fleece list --all` to see issue ids."),
            Self::PushFailed | Self::GitCommandFailed => None,
            Self::CycleDetected => Some("Pick a parent that is not a descendant of the issue."),
            Self::InvalidEnumValue => Some("Use one of the documented status/type/mode values."),
            Self::CorruptIssueLog => Some("Inspect .fleece/issues.jsonl at the reported line."),
            Self::TransientWriteFailure => Some("Check disk space and write permissions."),
            Self::QueueClosed => Some("Create a new service; the previous one was shut down."),
            Self::LockContention => Some("Retry after the other `fleece` process releases its lock."),
            Self::WrongBranch => Some("Check out the target branch, or sync a different branch."),
            Self::WorktreeNotFound => Some("Create a working copy for the branch first."),
            Self::FetchFailed => Some("Check network access and the remote configuration."),
            Self::ForeignChangesBlocking => {
                Some("Commit or stash the listed files, then sync again.")
            }
            Self::FastForwardFailed => Some("Rebase or merge the branch manually, then sync again."),
            Self::PushRejected => Some("Run sync again to pull the new remote commits."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by issue mutations, the store and the write queue.
#[derive(Debug, Error)]
pub enum FleeceError {
    #[error("issue not found: '{0}'")]
    IssueNotFound(String),

    #[error("setting '{parent}' as parent of '{child}' would create a cycle")]
    CycleDetected { parent: String, child: String },

    #[error("write queue is shut down")]
    QueueClosed,

    #[error("invalid value '{value}' for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("{}: line {line}: {message}", path.display())]
    CorruptLog {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to run git {command}: {source}")]
    GitSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lock timed out after {waited:?} at {}", path.display())]
    LockTimeout {
        path: PathBuf,
        waited: std::time::Duration,
    },
}

impl FleeceError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::IssueNotFound(_) => ErrorCode::IssueNotFound,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::QueueClosed => ErrorCode::QueueClosed,
            Self::InvalidValue { .. } => ErrorCode::InvalidEnumValue,
            Self::CorruptLog { .. } | Self::Json(_) => ErrorCode::CorruptIssueLog,
            Self::Io(_) => ErrorCode::TransientWriteFailure,
            Self::GitSpawn { .. } => ErrorCode::GitCommandFailed,
            Self::LockTimeout { .. } => ErrorCode::LockContention,
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Only raw I/O failures qualify; a corrupt log or a cycle fails the
    /// same way every time.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

pub type Result<T, E = FleeceError> = std::result::Result<T, E>;
