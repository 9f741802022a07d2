//! Durable per-project issue storage.
//!
//! A project's issues live in `.fleece/issues.jsonl`: one JSON object per
//! line, sorted by id so that the file diffs cleanly under git. The store
//! loads and saves the whole set at once; there is no partial update.
//!
//! - [`IssueStore`]: the async load/save seam used by the queue and the
//!   sync engine.
//! - [`JsonlIssueStore`]: the on-disk implementation.
//! - [`cache`]: per-project read cache in front of a store.

pub mod cache;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::FLEECE_DIR;
use crate::error::{FleeceError, Result};
use crate::model::Issue;

pub use cache::IssueCache;

/// Issue log file name inside `.fleece/`.
pub const ISSUES_FILE: &str = "issues.jsonl";

/// Contents of `.fleece/.gitignore`: lock and temp files are never tracked.
const GITIGNORE: &str = "*.lock\n*.tmp\n";

/// Path of the owned subtree for a project root.
#[must_use]
pub fn fleece_dir(project: &Path) -> PathBuf {
    project.join(FLEECE_DIR)
}

/// Path of the issue log for a project root.
#[must_use]
pub fn issues_path(project: &Path) -> PathBuf {
    fleece_dir(project).join(ISSUES_FILE)
}

/// Load/save seam for a project's full issue set.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Load every issue of the project. A missing log is an empty project.
    async fn load_all(&self, project: &Path) -> Result<Vec<Issue>>;

    /// Replace the project's issue set with `issues`.
    async fn save_all(&self, project: &Path, issues: &[Issue]) -> Result<()>;

    /// Create `.fleece/` (and its `.gitignore`) if missing.
    async fn ensure_directory_exists(&self, project: &Path) -> Result<()>;
}

/// JSON-lines store writing atomically via temp file, fsync and rename.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlIssueStore;

impl JsonlIssueStore {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IssueStore for JsonlIssueStore {
    async fn load_all(&self, project: &Path) -> Result<Vec<Issue>> {
        let path = issues_path(project);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let issues = parse_issue_log(&path, &content)?;
        debug!(path = %path.display(), count = issues.len(), "loaded issue log");
        Ok(issues)
    }

    async fn save_all(&self, project: &Path, issues: &[Issue]) -> Result<()> {
        self.ensure_directory_exists(project).await?;

        let path = issues_path(project);
        let body = render_issue_log(issues)?;
        let tmp = path.with_extension("jsonl.tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(body.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), count = issues.len(), "saved issue log");
        Ok(())
    }

    async fn ensure_directory_exists(&self, project: &Path) -> Result<()> {
        let dir = fleece_dir(project);
        tokio::fs::create_dir_all(&dir).await?;

        let gitignore = dir.join(".gitignore");
        if !tokio::fs::try_exists(&gitignore).await? {
            tokio::fs::write(&gitignore, GITIGNORE).await?;
        }
        Ok(())
    }
}

/// Parse a JSON-lines issue log. Blank lines are skipped; the first bad
/// line fails the whole load with its 1-based line number.
pub fn parse_issue_log(path: &Path, content: &str) -> Result<Vec<Issue>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<Issue>(line).map_err(|e| FleeceError::CorruptLog {
                path: path.to_path_buf(),
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Render issues as JSON lines sorted by id, with a trailing newline.
pub fn render_issue_log(issues: &[Issue]) -> Result<String> {
    let mut sorted: Vec<&Issue> = issues.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = String::new();
    for issue in sorted {
        out.push_str(&serde_json::to_string(issue)?);
        out.push('\n');
    }
    Ok(out)
}
