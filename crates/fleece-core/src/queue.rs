//! Ordered, single-writer pipeline in front of the issue store.
//!
//! Producers call [`WriteQueue::enqueue`], which updates the read cache and
//! appends the operation to an unbounded channel before returning. One
//! consumer task drains the channel in FIFO order and runs each operation's
//! action, so at most one write touches a project's log at any time.
//!
//! # Failure policy
//!
//! - Transient errors ([`FleeceError::is_transient`]) are retried with
//!   exponential backoff up to `max_attempts` total attempts.
//! - Exhausted retries and non-transient errors are logged and counted;
//!   the consumer moves on to the next operation. Enqueuers never see them.
//!
//! # Lifecycle
//!
//! `Running` from construction until [`WriteQueue::shutdown`], which stops
//! new enqueues, waits for the backlog up to a deadline, then aborts the
//! consumer if it is still busy.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{FleeceError, Result};
use crate::model::Issue;
use crate::store::IssueCache;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// The persisting half of a write.
#[async_trait]
pub trait WriteAction: Send + Sync {
    async fn apply(&self) -> Result<()>;
}

#[async_trait]
impl<F, Fut> WriteAction for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn apply(&self) -> Result<()> {
        (self)().await
    }
}

/// One queued mutation of one issue.
pub struct WriteOperation {
    pub project: PathBuf,
    pub issue_id: String,
    pub kind: WriteKind,
    pub queued_at: DateTime<Utc>,
    /// Post-mutation issue applied to the read cache at enqueue time.
    pub issue: Option<Issue>,
    action: Arc<dyn WriteAction>,
}

impl WriteOperation {
    pub fn new(
        project: impl Into<PathBuf>,
        issue_id: impl Into<String>,
        kind: WriteKind,
        action: impl WriteAction + 'static,
    ) -> Self {
        Self {
            project: project.into(),
            issue_id: issue_id.into(),
            kind,
            queued_at: Utc::now(),
            issue: None,
            action: Arc::new(action),
        }
    }

    #[must_use]
    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issue = Some(issue);
        self
    }

    async fn apply(&self) -> Result<()> {
        self.action.apply().await
    }
}

impl fmt::Debug for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteOperation")
            .field("project", &self.project)
            .field("issue_id", &self.issue_id)
            .field("kind", &self.kind)
            .field("queued_at", &self.queued_at)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Outcome of [`WriteQueue::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// `true` if every queued operation finished before the deadline.
    pub drained: bool,
    /// Operations still queued or in flight when the consumer stopped.
    pub remaining: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    pending: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

pub struct WriteQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<WriteOperation>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cache: Arc<IssueCache>,
    counters: Arc<Counters>,
}

impl WriteQueue {
    /// Start a queue and its consumer task. Must be called inside a tokio
    /// runtime.
    #[must_use]
    pub fn new(cache: Arc<IssueCache>, config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_consumer(rx, Arc::clone(&counters), config));
        info!(max_attempts = config.max_attempts, "write queue started");

        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            cache,
            counters,
        }
    }

    /// Queue `op` and update the read cache. Returns once queued, not once
    /// persisted.
    pub fn enqueue(&self, op: WriteOperation) -> Result<()> {
        let sender = lock(&self.sender);
        let Some(tx) = sender.as_ref() else {
            return Err(FleeceError::QueueClosed);
        };

        if let Some(issue) = &op.issue {
            self.cache.upsert(&op.project, issue.clone());
        }

        debug!(issue = %op.issue_id, kind = %op.kind, "enqueue write");
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(op).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(FleeceError::QueueClosed);
        }
        drop(sender);
        Ok(())
    }

    /// Operations queued or in flight.
    pub fn pending_count(&self) -> usize {
        self.counters.pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    pub fn cache(&self) -> &Arc<IssueCache> {
        &self.cache
    }

    /// Stop accepting writes and drain the backlog for at most `deadline`.
    ///
    /// Operations still pending at the deadline are dropped with the
    /// consumer. Calling this again returns the final counters.
    pub async fn shutdown(&self, deadline: Duration) -> DrainReport {
        lock(&self.sender).take();
        let worker = lock(&self.worker).take();

        let drained = match worker {
            Some(mut handle) => {
                if tokio::time::timeout(deadline, &mut handle).await.is_ok() {
                    true
                } else {
                    handle.abort();
                    false
                }
            }
            None => self.pending_count() == 0,
        };

        let report = DrainReport {
            drained,
            remaining: self.pending_count(),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        };

        if report.drained {
            info!(completed = report.completed, failed = report.failed, "write queue drained");
        } else {
            warn!(
                remaining = report.remaining,
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                "write queue shutdown deadline elapsed; pending writes dropped"
            );
        }
        report
    }
}

impl fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteQueue")
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_consumer(
    mut rx: mpsc::UnboundedReceiver<WriteOperation>,
    counters: Arc<Counters>,
    config: QueueConfig,
) {
    while let Some(op) = rx.recv().await {
        if apply_with_retry(&op, &config).await {
            counters.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            counters.failed.fetch_add(1, Ordering::SeqCst);
        }
        counters.pending.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("write queue consumer stopped");
}

/// Run one operation to completion or final failure. Returns `true` on
/// success.
async fn apply_with_retry(op: &WriteOperation, config: &QueueConfig) -> bool {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op.apply().await {
            Ok(()) => {
                debug!(issue = %op.issue_id, kind = %op.kind, attempt, "write applied");
                return true;
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = config.backoff(attempt);
                warn!(
                    issue = %op.issue_id,
                    kind = %op.kind,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient write failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(
                    issue = %op.issue_id,
                    project = %op.project.display(),
                    kind = %op.kind,
                    attempts = attempt,
                    code = %err.code(),
                    error = %err,
                    "write failed"
                );
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueType;
    use std::path::Path;

    fn fast_config(max_attempts: u32) -> QueueConfig {
        QueueConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            shutdown_deadline_ms: 1_000,
        }
    }

    fn recording_op(log: &Arc<Mutex<Vec<usize>>>, n: usize) -> WriteOperation {
        let log = Arc::clone(log);
        WriteOperation::new("/p", format!("fl-{n}"), WriteKind::Update, move || {
            let log = Arc::clone(&log);
            async move {
                lock(&log).push(n);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn applies_in_fifo_order() {
        let queue = WriteQueue::new(Arc::new(IssueCache::new()), fast_config(3));
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..50 {
            queue.enqueue(recording_op(&log, n)).expect("enqueue");
        }

        let report = queue.shutdown(Duration::from_secs(5)).await;
        assert!(report.drained);
        assert_eq!(report.completed, 50);
        assert_eq!(*lock(&log), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn cache_is_updated_at_enqueue_time() {
        let cache = Arc::new(IssueCache::new());
        let queue = WriteQueue::new(Arc::clone(&cache), fast_config(1));
        let issue = Issue::new("fl-abc", "Cached", IssueType::Task, Utc::now(), "tester");

        let op = WriteOperation::new("/p", "fl-abc", WriteKind::Create, || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .with_issue(issue);
        queue.enqueue(op).expect("enqueue");

        assert!(cache.get(Path::new("/p"), "fl-abc").is_some());
        queue.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let queue = WriteQueue::new(Arc::new(IssueCache::new()), fast_config(3));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        let op = WriteOperation::new("/p", "fl-1", WriteKind::Update, move || {
            let seen = Arc::clone(&seen);
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FleeceError::Io(std::io::Error::other("busy")))
                } else {
                    Ok(())
                }
            }
        });
        queue.enqueue(op).expect("enqueue");

        let report = queue.shutdown(Duration::from_secs(5)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_do_not_block_later_writes() {
        let queue = WriteQueue::new(Arc::new(IssueCache::new()), fast_config(2));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let log = Arc::new(Mutex::new(Vec::new()));

        queue
            .enqueue(WriteOperation::new("/p", "fl-bad", WriteKind::Update, move || {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(FleeceError::Io(std::io::Error::other("disk gone")))
                }
            }))
            .expect("enqueue");
        queue.enqueue(recording_op(&log, 7)).expect("enqueue");

        let report = queue.shutdown(Duration::from_secs(5)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(*lock(&log), vec![7]);
    }

    #[tokio::test]
    async fn non_transient_failures_are_not_retried() {
        let queue = WriteQueue::new(Arc::new(IssueCache::new()), fast_config(5));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        queue
            .enqueue(WriteOperation::new("/p", "fl-1", WriteKind::Delete, move || {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(FleeceError::IssueNotFound("fl-1".into()))
                }
            }))
            .expect("enqueue");

        let report = queue.shutdown(Duration::from_secs(5)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_rejected() {
        let queue = WriteQueue::new(Arc::new(IssueCache::new()), fast_config(1));
        queue.shutdown(Duration::from_secs(1)).await;
        assert!(queue.is_closed());

        let log = Arc::new(Mutex::new(Vec::new()));
        let err = queue.enqueue(recording_op(&log, 1)).expect_err("closed");
        assert!(matches!(err, FleeceError::QueueClosed));
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_deadline_abandons_slow_backlog() {
        let queue = WriteQueue::new(Arc::new(IssueCache::new()), fast_config(1));
        for n in 0..3 {
            queue
                .enqueue(WriteOperation::new("/p", format!("fl-{n}"), WriteKind::Update, || async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }))
                .expect("enqueue");
        }
        assert_eq!(queue.pending_count(), 3);

        let report = queue.shutdown(Duration::from_millis(50)).await;
        assert!(!report.drained);
        assert_eq!(report.remaining, 3);
        assert_eq!(report.completed, 0);
    }
}
