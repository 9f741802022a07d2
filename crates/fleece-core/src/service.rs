//! Issue operations exposed to callers.
//!
//! Every mutation follows the same path: load the project into the cache,
//! compute the new issue from the cached one, record a history snapshot,
//! then enqueue a write that upserts the issue into the on-disk log.
//! Validation errors (unknown id, cycle) are returned before anything is
//! recorded or queued.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{FleeceError, Result};
use crate::graph::{ParentChange, plan_parent_change};
use crate::history::HistoryRecorder;
use crate::model::{ExecutionMode, Issue, IssueType, ParentRef, Status, generate_issue_id};
use crate::queue::{DrainReport, WriteAction, WriteKind, WriteOperation, WriteQueue};
use crate::sort_order;
use crate::store::{IssueCache, IssueStore};

/// Fields accepted when creating an issue.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub issue_type: IssueType,
    pub description: Option<String>,
    pub priority: Option<u8>,
    pub execution_mode: Option<ExecutionMode>,
    pub assigned_to: Option<String>,
    pub tags: BTreeSet<String>,
    pub parent: Option<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>, issue_type: IssueType) -> Self {
        Self {
            title: title.into(),
            issue_type,
            description: None,
            priority: None,
            execution_mode: None,
            assigned_to: None,
            tags: BTreeSet::new(),
            parent: None,
        }
    }
}

/// A partial edit. `None` leaves a field untouched; clocked fields only
/// advance their own clock when set.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub status: Option<Status>,
    pub issue_type: Option<IssueType>,
    /// `Some(None)` unassigns.
    pub assigned_to: Option<Option<String>>,
    /// `Some(None)` unlinks.
    pub linked_pr: Option<Option<u64>>,
    pub description: Option<String>,
    pub priority: Option<u8>,
    pub execution_mode: Option<ExecutionMode>,
    pub add_tags: Vec<String>,
    pub add_linked_issues: Vec<String>,
}

impl IssueUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.issue_type.is_none()
            && self.assigned_to.is_none()
            && self.linked_pr.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.execution_mode.is_none()
            && self.add_tags.is_empty()
            && self.add_linked_issues.is_empty()
    }

    fn apply_to(self, issue: &mut Issue, actor: &str) {
        let at = Utc::now();
        if let Some(title) = self.title {
            issue.title.set(title, at, actor);
        }
        if let Some(status) = self.status {
            issue.status.set(status, at, actor);
        }
        if let Some(issue_type) = self.issue_type {
            issue.issue_type.set(issue_type, at, actor);
        }
        if let Some(assigned_to) = self.assigned_to {
            issue.assigned_to.set(assigned_to, at, actor);
        }
        if let Some(linked_pr) = self.linked_pr {
            issue.linked_pr.set(linked_pr, at, actor);
        }
        if let Some(description) = self.description {
            issue.description = Some(description);
        }
        if let Some(priority) = self.priority {
            issue.priority = Some(priority);
        }
        if let Some(mode) = self.execution_mode {
            issue.execution_mode = Some(mode);
        }
        issue.tags.extend(self.add_tags);
        issue.linked_issues.extend(self.add_linked_issues);
    }
}

pub struct IssueService {
    store: Arc<dyn IssueStore>,
    cache: Arc<IssueCache>,
    queue: WriteQueue,
    recorder: Arc<dyn HistoryRecorder>,
    /// Serializes read-modify-enqueue so concurrent callers never lose an
    /// update between reading the cache and queueing the write.
    mutation: Mutex<()>,
}

impl IssueService {
    pub fn new(
        store: Arc<dyn IssueStore>,
        cache: Arc<IssueCache>,
        queue: WriteQueue,
        recorder: Arc<dyn HistoryRecorder>,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            recorder,
            mutation: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<IssueCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn IssueStore> {
        &self.store
    }

    pub fn pending_writes(&self) -> usize {
        self.queue.pending_count()
    }

    /// Drain queued writes; see [`WriteQueue::shutdown`].
    pub async fn shutdown(&self, deadline: Duration) -> DrainReport {
        self.queue.shutdown(deadline).await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get(&self, project: &Path, id: &str) -> Result<Issue> {
        self.cache.ensure_loaded(self.store.as_ref(), project).await?;
        self.cache
            .get(project, id)
            .ok_or_else(|| FleeceError::IssueNotFound(id.to_string()))
    }

    /// Issues sorted by id. Terminal statuses are hidden unless asked for.
    pub async fn list(&self, project: &Path, include_terminal: bool) -> Result<Vec<Issue>> {
        self.cache.ensure_loaded(self.store.as_ref(), project).await?;
        let mut issues = self.cache.list(project);
        if !include_terminal {
            issues.retain(|i| !i.is_terminal());
        }
        Ok(issues)
    }

    /// Children of `parent_id` in sort order.
    pub async fn children(&self, project: &Path, parent_id: &str) -> Result<Vec<Issue>> {
        let mut children: Vec<(String, Issue)> = self
            .list(project, true)
            .await?
            .into_iter()
            .filter_map(|issue| {
                let key = issue
                    .parent_issues
                    .iter()
                    .find(|p| p.parent_issue == parent_id)?
                    .sort_order
                    .clone();
                Some((key, issue))
            })
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(children.into_iter().map(|(_, issue)| issue).collect())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub async fn create_issue(&self, project: &Path, new: NewIssue, actor: &str) -> Result<Issue> {
        let _guard = self.mutation.lock().await;
        self.cache.ensure_loaded(self.store.as_ref(), project).await?;
        let existing = self.cache.snapshot(project);

        let at = Utc::now();
        let mut id = generate_issue_id(&new.title, actor, at);
        while existing.contains_key(&id) {
            id = generate_issue_id(&new.title, actor, at);
        }

        let mut issue = Issue::new(id, new.title, new.issue_type, at, actor);
        issue.description = new.description.filter(|d| !d.is_empty());
        issue.priority = new.priority;
        issue.execution_mode = new.execution_mode;
        issue.tags = new.tags;
        if let Some(assignee) = new.assigned_to {
            issue.assigned_to.value = Some(assignee);
        }
        if let Some(parent_id) = new.parent {
            if !existing.contains_key(&parent_id) {
                return Err(FleeceError::IssueNotFound(parent_id));
            }
            let last = existing
                .values()
                .flat_map(|i| i.parent_issues.iter())
                .filter(|p| p.parent_issue == parent_id)
                .map(|p| p.sort_order.as_str())
                .max();
            let key = sort_order::key_after(last);
            issue.parent_issues.push(ParentRef::new(parent_id, key));
        }

        self.commit(project, issue, WriteKind::Create, "create", actor)
            .await
    }

    pub async fn update_issue(
        &self,
        project: &Path,
        id: &str,
        update: IssueUpdate,
        actor: &str,
    ) -> Result<Issue> {
        let _guard = self.mutation.lock().await;
        let mut issue = self.get(project, id).await?;
        update.apply_to(&mut issue, actor);
        self.commit(project, issue, WriteKind::Update, "update", actor)
            .await
    }

    /// Soft delete: the issue stays in the log with status `Deleted`.
    pub async fn delete_issue(&self, project: &Path, id: &str, actor: &str) -> Result<Issue> {
        let _guard = self.mutation.lock().await;
        let mut issue = self.get(project, id).await?;
        issue.status.set(Status::Deleted, Utc::now(), actor);
        self.commit(project, issue, WriteKind::Delete, "delete", actor)
            .await
    }

    /// Make `parent_id` a parent of `child_id`, either as its only parent
    /// (`replace_existing`) or in addition to the current ones.
    pub async fn set_parent(
        &self,
        project: &Path,
        child_id: &str,
        parent_id: &str,
        replace_existing: bool,
        actor: &str,
    ) -> Result<Issue> {
        self.change_parent(
            project,
            child_id,
            parent_id,
            ParentChange::Set { replace_existing },
            actor,
        )
        .await
    }

    pub async fn add_parent(
        &self,
        project: &Path,
        child_id: &str,
        parent_id: &str,
        actor: &str,
    ) -> Result<Issue> {
        self.change_parent(project, child_id, parent_id, ParentChange::Add, actor)
            .await
    }

    pub async fn remove_parent(
        &self,
        project: &Path,
        child_id: &str,
        parent_id: &str,
        actor: &str,
    ) -> Result<Issue> {
        self.change_parent(project, child_id, parent_id, ParentChange::Remove, actor)
            .await
    }

    async fn change_parent(
        &self,
        project: &Path,
        child_id: &str,
        parent_id: &str,
        change: ParentChange,
        actor: &str,
    ) -> Result<Issue> {
        let _guard = self.mutation.lock().await;
        self.cache.ensure_loaded(self.store.as_ref(), project).await?;
        let issues = self.cache.snapshot(project);
        let updated = plan_parent_change(&issues, child_id, parent_id, change)?;

        let action = match change {
            ParentChange::Set { .. } => "set-parent",
            ParentChange::Add => "add-parent",
            ParentChange::Remove => "remove-parent",
        };
        self.commit(project, updated, WriteKind::Update, action, actor)
            .await
    }

    /// Record the snapshot, then enqueue the write.
    async fn commit(
        &self,
        project: &Path,
        issue: Issue,
        kind: WriteKind,
        action: &str,
        actor: &str,
    ) -> Result<Issue> {
        if let Err(err) = self
            .recorder
            .record_snapshot(project, std::slice::from_ref(&issue), action, actor)
            .await
        {
            warn!(issue = %issue.id, action, error = %err, "history snapshot failed");
        }

        let op = WriteOperation::new(
            project,
            issue.id.clone(),
            kind,
            persist_action(Arc::clone(&self.store), project.to_path_buf(), issue.clone()),
        )
        .with_issue(issue.clone());
        self.queue.enqueue(op)?;

        info!(issue = %issue.id, action, actor, "issue mutation queued");
        Ok(issue)
    }
}

/// Write action upserting `issue` into the project's log.
fn persist_action(store: Arc<dyn IssueStore>, project: PathBuf, issue: Issue) -> impl WriteAction {
    move || {
        let store = Arc::clone(&store);
        let project = project.clone();
        let issue = issue.clone();
        async move { upsert_on_disk(store.as_ref(), &project, issue).await }
    }
}

async fn upsert_on_disk(store: &dyn IssueStore, project: &Path, issue: Issue) -> Result<()> {
    let mut issues = store.load_all(project).await?;
    match issues.iter_mut().find(|i| i.id == issue.id) {
        Some(slot) => *slot = issue,
        None => issues.push(issue),
    }
    store.save_all(project, &issues).await
}
