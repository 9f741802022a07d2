//! Git synchronization of the issue log.
//!
//! - [`git`]: the [`GitRunner`] seam and the process-backed runner.
//! - [`status`]: porcelain status parsing.
//! - [`engine`]: the [`SyncEngine`] protocol.
//! - [`result`]: [`SyncResult`], [`BranchStatus`] and the failure taxonomy.
//! - [`worktree`]: branch → working copy resolution.

pub mod engine;
pub mod git;
pub mod result;
pub mod status;
pub mod worktree;

pub use engine::SyncEngine;
pub use git::{GitOutput, GitRunner, ProcessGit, git_dir};
pub use result::{BranchStatus, SyncFailure, SyncOutcome, SyncResult};
pub use worktree::{GitWorktrees, StaticWorktrees, WorktreeResolver};
