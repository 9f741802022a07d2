//! Mapping a branch name to the working copy that has it checked out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::sync::git::GitRunner;

#[async_trait]
pub trait WorktreeResolver: Send + Sync {
    /// Root of the working copy with `branch` checked out, if any.
    async fn resolve(&self, branch: &str) -> Option<PathBuf>;
}

/// Fixed branch → path table.
#[derive(Debug, Clone, Default)]
pub struct StaticWorktrees {
    paths: HashMap<String, PathBuf>,
}

impl StaticWorktrees {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, branch: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.insert(branch, path);
        self
    }

    pub fn insert(&mut self, branch: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(branch.into(), path.into());
    }
}

#[async_trait]
impl WorktreeResolver for StaticWorktrees {
    async fn resolve(&self, branch: &str) -> Option<PathBuf> {
        self.paths.get(branch).cloned()
    }
}

/// Resolves through `git worktree list --porcelain` run in `repo`.
pub struct GitWorktrees {
    git: Arc<dyn GitRunner>,
    repo: PathBuf,
}

impl GitWorktrees {
    pub fn new(git: Arc<dyn GitRunner>, repo: impl Into<PathBuf>) -> Self {
        Self {
            git,
            repo: repo.into(),
        }
    }
}

#[async_trait]
impl WorktreeResolver for GitWorktrees {
    async fn resolve(&self, branch: &str) -> Option<PathBuf> {
        let output = self
            .git
            .run(&self.repo, &["worktree", "list", "--porcelain"])
            .await
            .ok()
            .filter(|o| o.success)?;
        parse_worktree_list(&output.stdout)
            .into_iter()
            .find_map(|(path, b)| (b.as_deref() == Some(branch)).then_some(path))
    }
}

/// `(path, branch)` pairs from porcelain worktree output. Detached
/// worktrees have no branch.
fn parse_worktree_list(output: &str) -> Vec<(PathBuf, Option<String>)> {
    let mut entries = Vec::new();
    let mut current: Option<(PathBuf, Option<String>)> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.extend(current.take());
            current = Some((PathBuf::from(path), None));
        } else if let Some(reference) = line.strip_prefix("branch ") {
            if let Some((_, branch)) = current.as_mut() {
                let name = reference.strip_prefix("refs/heads/").unwrap_or(reference);
                *branch = Some(name.to_string());
            }
        }
    }
    entries.extend(current);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_worktrees_resolve_known_branches() {
        let resolver = StaticWorktrees::new().with("main", "/src/app");
        assert_eq!(resolver.resolve("main").await, Some(PathBuf::from("/src/app")));
        assert_eq!(resolver.resolve("feature").await, None);
    }

    #[test]
    fn parses_porcelain_worktree_list() {
        let out = "worktree /src/app\nHEAD abc\nbranch refs/heads/main\n\n\
                   worktree /src/app-wt\nHEAD def\ndetached\n\n\
                   worktree /src/app-feat\nHEAD 123\nbranch refs/heads/feat/x\n";
        let entries = parse_worktree_list(out);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], (PathBuf::from("/src/app"), Some("main".into())));
        assert_eq!(entries[1].1, None);
        assert_eq!(entries[2].1.as_deref(), Some("feat/x"));
    }
}
