//! Command handlers and the wiring they share.

pub mod create;
pub mod delete;
pub mod list;
pub mod parent;
pub mod show;
pub mod status;
pub mod sync;
pub mod update;

use crate::output::{CliError, OutputMode, render_error};
use fleece_core::config::ProjectConfig;
use fleece_core::error::FleeceError;
use fleece_core::history::NoopRecorder;
use fleece_core::lock::{GIT_DIR_LOCK_FILE, SYNC_LOCK_FILE, SyncLock};
use fleece_core::queue::WriteQueue;
use fleece_core::service::IssueService;
use fleece_core::store::{IssueCache, IssueStore, JsonlIssueStore, fleece_dir};
use fleece_core::sync::{ProcessGit, git_dir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// How long a command waits for another `fleece` process holding the lock.
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a command needs, resolved once in `main`.
pub struct Context {
    pub project_root: PathBuf,
    pub output: OutputMode,
    pub actor: String,
    pub config: ProjectConfig,
}

impl Context {
    /// Build a service over the on-disk store with a fresh cache and queue.
    pub fn open_service(&self) -> IssueService {
        let cache = Arc::new(IssueCache::new());
        let queue = WriteQueue::new(Arc::clone(&cache), self.config.queue);
        IssueService::new(
            Arc::new(JsonlIssueStore::new()),
            cache,
            queue,
            Arc::new(NoopRecorder),
        )
    }

    /// Take the lock before mutating the project's issues. Inside a git
    /// working copy it lives in the git directory; elsewhere `.fleece/` is
    /// created to hold it.
    pub async fn lock_project(&self) -> anyhow::Result<SyncLock> {
        let path = match git_dir(&ProcessGit, &self.project_root).await {
            Some(dir) => dir.join(GIT_DIR_LOCK_FILE),
            None => {
                JsonlIssueStore::new()
                    .ensure_directory_exists(&self.project_root)
                    .await
                    .map_err(|e| self.fail(&e))?;
                fleece_dir(&self.project_root).join(SYNC_LOCK_FILE)
            }
        };
        self.acquire(path).await
    }

    /// Take the lock before syncing the working copy at `worktree`. Nothing
    /// is written inside the working tree.
    pub async fn lock_worktree(&self, worktree: &Path) -> anyhow::Result<SyncLock> {
        let Some(dir) = git_dir(&ProcessGit, worktree).await else {
            let err = CliError::new(format!(
                "{} is not inside a git working copy",
                worktree.display()
            ));
            render_error(self.output, &err)?;
            anyhow::bail!("{}", err.message);
        };
        self.acquire(dir.join(GIT_DIR_LOCK_FILE)).await
    }

    async fn acquire(&self, path: PathBuf) -> anyhow::Result<SyncLock> {
        tokio::task::spawn_blocking(move || SyncLock::acquire(&path, LOCK_TIMEOUT))
            .await?
            .map_err(|e| self.fail(&e))
    }

    /// Drain queued writes within the configured deadline.
    pub async fn drain(&self, service: &IssueService) -> anyhow::Result<()> {
        let report = service
            .shutdown(self.config.queue.shutdown_deadline())
            .await;
        if report.drained && report.failed == 0 {
            return Ok(());
        }
        warn!(?report, "write queue did not drain cleanly");
        let err = CliError::new(format!(
            "{} write(s) failed and {} were not persisted before the deadline",
            report.failed, report.remaining
        ));
        render_error(self.output, &err)?;
        anyhow::bail!("{}", err.message)
    }

    /// Render `err` and turn it into the command's failure.
    pub fn fail(&self, err: &FleeceError) -> anyhow::Error {
        let cli = CliError::from(err);
        if let Err(render_err) = render_error(self.output, &cli) {
            return render_err;
        }
        anyhow::anyhow!("{}", cli.message)
    }
}

/// Run a mutation under the project lock and drain its writes before
/// returning. The mutation's own error wins over a drain failure.
pub async fn mutate<T, F, Fut>(ctx: &Context, op: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<IssueService>) -> Fut,
    Fut: std::future::Future<Output = Result<T, FleeceError>>,
{
    let _lock = ctx.lock_project().await?;
    let service = Arc::new(ctx.open_service());
    let result = op(Arc::clone(&service)).await;
    let drained = ctx.drain(&service).await;
    let value = result.map_err(|e| ctx.fail(&e))?;
    drained?;
    Ok(value)
}

/// Split comma-separated and repeated values into a flat list.
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
