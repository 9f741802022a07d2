use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

/// Directory holding the issue log and project settings.
pub const FLEECE_DIR: &str = ".fleece";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// `[sync]` section of `.fleece/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    /// Appended to every automated commit so CI can skip it.
    #[serde(default = "default_commit_marker")]
    pub commit_marker: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            commit_message: default_commit_message(),
            commit_marker: default_commit_marker(),
        }
    }
}

impl SyncConfig {
    /// Full commit message with the marker appended (if any).
    #[must_use]
    pub fn full_commit_message(&self) -> String {
        let marker = self.commit_marker.trim();
        if marker.is_empty() {
            self.commit_message.clone()
        } else {
            format!("{} {marker}", self.commit_message)
        }
    }
}

/// `[queue]` section: retry and shutdown policy of the write queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            shutdown_deadline_ms: default_shutdown_deadline_ms(),
        }
    }
}

impl QueueConfig {
    /// Delay before retry number `attempt` (1-based): doubles each time,
    /// capped at `max_backoff_ms`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64 << attempt.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    #[must_use]
    pub const fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(FLEECE_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("fleece/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_commit_message() -> String {
    "Sync fleece issues".to_string()
}

fn default_commit_marker() -> String {
    "[skip ci]".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    50
}

const fn default_max_backoff_ms() -> u64 {
    2_000
}

const fn default_shutdown_deadline_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.sync.remote, "origin");
        assert_eq!(cfg.sync.commit_marker, "[skip ci]");
        assert_eq!(cfg.queue.max_attempts, 3);
        assert_eq!(cfg.queue.shutdown_deadline(), Duration::from_secs(5));
    }

    #[test]
    fn partial_project_config_fills_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let dir = root.path().join(FLEECE_DIR);
        std::fs::create_dir_all(&dir).expect("create .fleece");
        std::fs::write(
            dir.join("config.toml"),
            "[sync]\nremote = \"upstream\"\n\n[queue]\nmax_attempts = 5\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.sync.remote, "upstream");
        assert_eq!(cfg.sync.commit_message, "Sync fleece issues");
        assert_eq!(cfg.queue.max_attempts, 5);
        assert_eq!(cfg.queue.initial_backoff_ms, 50);
    }

    #[test]
    fn invalid_project_config_reports_path() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let dir = root.path().join(FLEECE_DIR);
        std::fs::create_dir_all(&dir).expect("create .fleece");
        std::fs::write(dir.join("config.toml"), "[sync\nremote = 1").expect("write config");

        let err = load_project_config(root.path()).expect_err("parse must fail");
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn commit_message_carries_marker() {
        let mut sync = SyncConfig::default();
        assert_eq!(sync.full_commit_message(), "Sync fleece issues [skip ci]");

        sync.commit_marker = "  ".to_string();
        assert_eq!(sync.full_commit_message(), "Sync fleece issues");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let q = QueueConfig::default();
        assert_eq!(q.backoff(1), Duration::from_millis(50));
        assert_eq!(q.backoff(2), Duration::from_millis(100));
        assert_eq!(q.backoff(3), Duration::from_millis(200));
        assert_eq!(q.backoff(10), Duration::from_millis(2_000));
        assert_eq!(q.backoff(u32::MAX), Duration::from_millis(2_000));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn env_format_beats_user_config() {
        assert_eq!(resolve_output(false, Some("json"), Some("human")), "pretty");
        assert_eq!(resolve_output(false, Some("text"), Some("bogus")), "text");
    }

    #[test]
    fn user_config_parses_actor_and_output() {
        let cfg: UserConfig =
            toml::from_str("actor = \"alice\"\noutput = \"json\"\n").expect("parse");
        assert_eq!(cfg.actor.as_deref(), Some("alice"));
        assert_eq!(cfg.output.as_deref(), Some("json"));
    }
}
