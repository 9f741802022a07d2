//! Per-project in-memory read cache.
//!
//! The cache is an explicit object owned by whoever builds the service and
//! keyed by project root. A project is loaded lazily on first use; writes
//! update it at enqueue time so reads observe a mutation before it reaches
//! disk. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::model::Issue;
use crate::store::IssueStore;

type ProjectIssues = HashMap<String, Issue>;

#[derive(Debug, Default)]
pub struct IssueCache {
    projects: Mutex<HashMap<PathBuf, ProjectIssues>>,
}

impl IssueCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, ProjectIssues>> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loaded(&self, project: &Path) -> bool {
        self.lock().contains_key(project)
    }

    /// Load the project from `store` unless it is already cached.
    pub async fn ensure_loaded(&self, store: &dyn IssueStore, project: &Path) -> Result<()> {
        if self.is_loaded(project) {
            return Ok(());
        }
        let issues = store.load_all(project).await?;
        // A concurrent writer may have populated the entry meanwhile; keep it.
        self.lock()
            .entry(project.to_path_buf())
            .or_insert_with(|| index(issues));
        Ok(())
    }

    /// Discard cached state and reload it from disk. Returns the issue count.
    pub async fn reload_from_disk(&self, store: &dyn IssueStore, project: &Path) -> Result<usize> {
        let issues = store.load_all(project).await?;
        let count = issues.len();
        self.replace_all(project, issues);
        tracing::debug!(project = %project.display(), count, "reloaded issue cache");
        Ok(count)
    }

    pub fn get(&self, project: &Path, id: &str) -> Option<Issue> {
        self.lock().get(project)?.get(id).cloned()
    }

    /// Clone of the project's issues keyed by id (empty if not loaded).
    pub fn snapshot(&self, project: &Path) -> HashMap<String, Issue> {
        self.lock().get(project).cloned().unwrap_or_default()
    }

    /// The project's issues sorted by id.
    pub fn list(&self, project: &Path) -> Vec<Issue> {
        let mut issues: Vec<Issue> = self
            .lock()
            .get(project)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        issues
    }

    pub fn upsert(&self, project: &Path, issue: Issue) {
        self.lock()
            .entry(project.to_path_buf())
            .or_default()
            .insert(issue.id.clone(), issue);
    }

    pub fn replace_all(&self, project: &Path, issues: Vec<Issue>) {
        self.lock().insert(project.to_path_buf(), index(issues));
    }

    pub fn invalidate(&self, project: &Path) {
        self.lock().remove(project);
    }
}

fn index(issues: Vec<Issue>) -> ProjectIssues {
    issues.into_iter().map(|i| (i.id.clone(), i)).collect()
}
