//! End-to-end sync between two clones of a bare remote, using the real
//! `git` binary. Skipped when git is not installed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fleece_core::config::SyncConfig;
use fleece_core::error::Result;
use fleece_core::model::{Issue, IssueType, Status};
use fleece_core::store::{IssueStore, JsonlIssueStore};
use fleece_core::sync::{GitOutput, GitRunner, ProcessGit, SyncEngine, SyncFailure, SyncOutcome};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn git(cwd: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn configure_identity(repo: &Path, name: &str) {
    git(repo, &["config", "user.name", name]);
    git(repo, &["config", "user.email", &format!("{name}@example.com")]);
    git(repo, &["config", "commit.gpgsign", "false"]);
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// A bare remote with one seeded commit on `main`, plus two clones.
struct Remote {
    _root: TempDir,
    alice: PathBuf,
    bob: PathBuf,
}

impl Remote {
    async fn seeded(seed: &[Issue]) -> Self {
        let root = TempDir::new().unwrap();
        let bare = root.path().join("remote.git");
        std::fs::create_dir_all(&bare).unwrap();
        git(&bare, &["init", "--bare", "--quiet"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let alice = root.path().join("alice");
        let bob = root.path().join("bob");
        git(root.path(), &["clone", "--quiet", "remote.git", "alice"]);
        configure_identity(&alice, "alice");
        git(&alice, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        std::fs::write(alice.join("README.md"), "# project\n").unwrap();
        JsonlIssueStore.save_all(&alice, seed).await.unwrap();
        git(&alice, &["add", "-A"]);
        git(&alice, &["commit", "--quiet", "-m", "seed"]);
        git(&alice, &["push", "--quiet", "-u", "origin", "main"]);

        git(root.path(), &["clone", "--quiet", "remote.git", "bob"]);
        configure_identity(&bob, "bob");

        Self {
            _root: root,
            alice,
            bob,
        }
    }
}

fn engine_with(git: Arc<dyn GitRunner>) -> SyncEngine {
    SyncEngine::new(git, Arc::new(JsonlIssueStore), SyncConfig::default())
}

fn engine() -> SyncEngine {
    engine_with(Arc::new(ProcessGit))
}

async fn load(project: &Path) -> Vec<Issue> {
    JsonlIssueStore.load_all(project).await.unwrap()
}

async fn edit(project: &Path, f: impl FnOnce(&mut Vec<Issue>)) {
    let mut issues = load(project).await;
    f(&mut issues);
    JsonlIssueStore.save_all(project, &issues).await.unwrap();
}

fn ids(issues: &[Issue]) -> Vec<&str> {
    issues.iter().map(|i| i.id.as_str()).collect()
}

fn is_clean(repo: &Path) -> bool {
    git(repo, &["status", "--porcelain"]).trim().is_empty()
}

/// Real git with `fetch` short-circuited, so remote-tracking refs go stale.
struct StaleFetch;

#[async_trait]
impl GitRunner for StaleFetch {
    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        if args.first() == Some(&"fetch") {
            return Ok(GitOutput::ok(""));
        }
        ProcessGit.run(cwd, args).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_creates_are_unioned() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }
    let seed = Issue::new("fl-seed01", "Seed", IssueType::Task, t0(), "alice");
    let remote = Remote::seeded(&[seed]).await;

    let at = t0() + Duration::minutes(1);
    edit(&remote.alice, |issues| {
        issues.push(Issue::new("fl-alice1", "From alice", IssueType::Feature, at, "alice"));
    })
    .await;
    edit(&remote.bob, |issues| {
        issues.push(Issue::new("fl-bob001", "From bob", IssueType::Bug, at, "bob"));
    })
    .await;

    let first = engine().sync(&remote.alice, "main").await;
    assert_eq!(first.outcome, SyncOutcome::Pushed, "{}", first.message);

    let second = engine().sync(&remote.bob, "main").await;
    assert_eq!(second.outcome, SyncOutcome::Merged, "{}", second.message);
    assert_eq!(second.behind, 1);
    let stats = second.merge_stats.expect("merge stats");
    assert_eq!(stats.new_local + stats.new_remote, 2);
    assert!(is_clean(&remote.bob));

    let third = engine().sync(&remote.alice, "main").await;
    assert_eq!(third.outcome, SyncOutcome::FastForwarded, "{}", third.message);

    let expected = vec!["fl-alice1", "fl-bob001", "fl-seed01"];
    assert_eq!(ids(&load(&remote.alice).await), expected);
    assert_eq!(ids(&load(&remote.bob).await), expected);
    assert!(git(&remote.bob, &["stash", "list"]).trim().is_empty());
}

#[tokio::test]
async fn edits_to_different_fields_both_survive() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }
    let seed = Issue::new("fl-shared", "Original title", IssueType::Task, t0(), "alice");
    let remote = Remote::seeded(&[seed]).await;

    edit(&remote.alice, |issues| {
        issues[0]
            .status
            .set(Status::Progress, t0() + Duration::minutes(1), "alice");
    })
    .await;
    edit(&remote.bob, |issues| {
        issues[0]
            .title
            .set("Retitled by bob".to_string(), t0() + Duration::minutes(2), "bob");
    })
    .await;

    assert!(engine().sync(&remote.alice, "main").await.is_success());
    let merged = engine().sync(&remote.bob, "main").await;
    assert_eq!(merged.outcome, SyncOutcome::Merged, "{}", merged.message);
    assert!(engine().sync(&remote.alice, "main").await.is_success());

    for project in [&remote.alice, &remote.bob] {
        let issues = load(project).await;
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].status.value, Status::Progress);
        assert_eq!(issues[0].title.value, "Retitled by bob");
    }
}

#[tokio::test]
async fn foreign_edits_block_merge_and_stay_untouched() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }
    let remote = Remote::seeded(&[]).await;

    edit(&remote.alice, |issues| {
        issues.push(Issue::new("fl-alice1", "From alice", IssueType::Task, t0(), "alice"));
    })
    .await;
    assert!(engine().sync(&remote.alice, "main").await.is_success());

    edit(&remote.bob, |issues| {
        issues.push(Issue::new("fl-bob001", "From bob", IssueType::Task, t0(), "bob"));
    })
    .await;
    std::fs::write(remote.bob.join("README.md"), "# work in progress\n").unwrap();
    let head_before = git(&remote.bob, &["rev-parse", "HEAD"]);

    let result = engine().sync(&remote.bob, "main").await;
    assert!(matches!(
        result.error,
        Some(SyncFailure::ForeignChangesBlocking { .. })
    ));
    assert_eq!(result.foreign_files, vec!["README.md"]);
    assert_eq!(git(&remote.bob, &["rev-parse", "HEAD"]), head_before);
    assert_eq!(ids(&load(&remote.bob).await), vec!["fl-bob001"]);
    assert_eq!(
        std::fs::read_to_string(remote.bob.join("README.md")).unwrap(),
        "# work in progress\n"
    );
}

#[tokio::test]
async fn push_rejected_after_remote_moves_requires_pull() {
    if !git_available() {
        eprintln!("git not available; skipping");
        return;
    }
    let remote = Remote::seeded(&[]).await;

    edit(&remote.alice, |issues| {
        issues.push(Issue::new("fl-alice1", "From alice", IssueType::Task, t0(), "alice"));
    })
    .await;
    assert!(engine().sync(&remote.alice, "main").await.is_success());

    // Bob's view of the remote is stale: he believes he is not behind.
    edit(&remote.bob, |issues| {
        issues.push(Issue::new("fl-bob001", "From bob", IssueType::Task, t0(), "bob"));
    })
    .await;
    let stale = engine_with(Arc::new(StaleFetch));
    let result = stale.sync(&remote.bob, "main").await;

    assert_eq!(result.outcome, SyncOutcome::Failed);
    assert!(result.requires_pull_first);
    assert!(matches!(result.error, Some(SyncFailure::PushRejected { .. })));
    assert_eq!(result.error_code, Some("E7006"));

    // The local commit is in place and nothing is left dirty.
    assert!(is_clean(&remote.bob));
    assert_eq!(ids(&load(&remote.bob).await), vec!["fl-bob001"]);
    let last = git(&remote.bob, &["log", "-1", "--format=%s"]);
    assert_eq!(last.trim(), "Sync fleece issues [skip ci]");
}
