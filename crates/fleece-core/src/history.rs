//! Audit trail of issue mutations.
//!
//! The service calls a [`HistoryRecorder`] with the affected issues before
//! each mutation is enqueued. Recording failures are logged by the caller
//! and never block the write.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::Issue;

#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record_snapshot(
        &self,
        project: &Path,
        issues: &[Issue],
        action: &str,
        actor: &str,
    ) -> Result<()>;
}

/// Recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

#[async_trait]
impl HistoryRecorder for NoopRecorder {
    async fn record_snapshot(&self, _: &Path, _: &[Issue], _: &str, _: &str) -> Result<()> {
        Ok(())
    }
}

/// One recorded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub project: PathBuf,
    pub action: String,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
    pub issues: Vec<Issue>,
}

/// Recorder keeping every snapshot in memory, oldest first.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryRecorder for MemoryRecorder {
    async fn record_snapshot(
        &self,
        project: &Path,
        issues: &[Issue],
        action: &str,
        actor: &str,
    ) -> Result<()> {
        let entry = HistoryEntry {
            project: project.to_path_buf(),
            action: action.to_string(),
            actor: actor.to_string(),
            recorded_at: Utc::now(),
            issues: issues.to_vec(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Ok(())
    }
}
