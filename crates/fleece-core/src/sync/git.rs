//! The git execution seam.
//!
//! The sync engine never shells out directly; it asks a [`GitRunner`] to
//! run one command in one working copy and inspects the captured output.
//! Tests substitute a scripted runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FleeceError, Result};

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Runs git commands. `Err` means git could not be started at all; a
/// non-zero exit is reported through [`GitOutput::success`].
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput>;
}

/// Runs the `git` binary from `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessGit;

#[async_trait]
impl GitRunner for ProcessGit {
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| FleeceError::GitSpawn {
                command: args.join(" "),
                source,
            })?;

        let result = GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            cwd = %cwd.display(),
            command = %args.join(" "),
            success = result.success,
            "git"
        );
        Ok(result)
    }
}

/// The `.git` directory of the working copy at `project`, or `None` if it
/// is not inside one. Linked worktrees get their own directory.
pub async fn git_dir(git: &dyn GitRunner, project: &Path) -> Option<PathBuf> {
    let out = git.run(project, &["rev-parse", "--git-dir"]).await.ok()?;
    if !out.success {
        return None;
    }
    let dir = PathBuf::from(out.stdout_trimmed());
    if dir.as_os_str().is_empty() {
        return None;
    }
    Some(if dir.is_absolute() { dir } else { project.join(dir) })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Answer(GitOutput);

    #[async_trait]
    impl GitRunner for Answer {
        async fn run(&self, _cwd: &Path, _args: &[&str]) -> Result<GitOutput> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn relative_git_dir_is_joined_to_the_project() {
        let git = Answer(GitOutput::ok(".git\n"));
        assert_eq!(
            git_dir(&git, Path::new("/work/repo")).await,
            Some(PathBuf::from("/work/repo/.git"))
        );
    }

    #[tokio::test]
    async fn absolute_git_dir_is_kept() {
        let git = Answer(GitOutput::ok("/work/repo/.git/worktrees/feature\n"));
        assert_eq!(
            git_dir(&git, Path::new("/work/feature")).await,
            Some(PathBuf::from("/work/repo/.git/worktrees/feature"))
        );
    }

    #[tokio::test]
    async fn outside_a_repository_there_is_none() {
        let git = Answer(GitOutput::failed("fatal: not a git repository\n"));
        assert_eq!(git_dir(&git, Path::new("/tmp")).await, None);
    }
}
