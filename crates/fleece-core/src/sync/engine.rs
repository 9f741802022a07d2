//! Git reconciliation of the `.fleece/` subtree.
//!
//! One [`SyncEngine::sync`] call brings a working copy's issue log in line
//! with its upstream branch:
//!
//! 1. Verify the target branch is checked out.
//! 2. Fetch the remote.
//! 3. Count commits behind/ahead of `<remote>/<branch>`.
//! 4. Split uncommitted changes into owned (`.fleece/`) and foreign files.
//! 5. Act on the decision table:
//!
//! | behind | owned | foreign | action                                   |
//! |--------|-------|---------|------------------------------------------|
//! | 0      | none  | any     | nothing to do                            |
//! | 0      | some  | any     | commit `.fleece/` only, push             |
//! | >0     | any   | some    | refuse, report the foreign files         |
//! | >0     | none  | none    | fast-forward                             |
//! | >0     | some  | none    | stash, fast-forward, merge issues, push  |
//!
//! # Stash-scoped merge
//!
//! Local issue edits are set aside with a pathspec-limited stash, the
//! branch is fast-forwarded, and the stashed and fetched logs are merged
//! field by field with [`merge_snapshots`] instead of textually. The stash
//! is dropped once the merge is committed; it is only popped to undo.
//!
//! Every failure before the commit leaves the working copy as it was
//! found. A failed push leaves a clean tree with the commit in place; after
//! a rejection the history has diverged and has to be pulled before
//! syncing again.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{FLEECE_DIR, SyncConfig};
use crate::crdt::merge_snapshots;
use crate::model::Issue;
use crate::store::IssueStore;
use crate::sync::git::{GitOutput, GitRunner};
use crate::sync::result::{BranchStatus, SyncFailure, SyncOutcome, SyncResult};
use crate::sync::status::parse_porcelain;
use crate::sync::worktree::WorktreeResolver;

const FOREIGN_EXCLUDE: &str = ":(exclude).fleece";
const STASH_MESSAGE: &str = "fleece sync";

type SyncStep<T> = Result<T, SyncFailure>;

/// How to unwind a failed stash-scoped merge.
#[derive(Debug, Clone, Copy)]
enum Undo {
    /// Nothing moved yet; restore the stashed edits.
    PopStash,
    /// The branch moved; reset to the original head, then restore.
    Rollback,
}

pub struct SyncEngine {
    git: Arc<dyn GitRunner>,
    store: Arc<dyn IssueStore>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(git: Arc<dyn GitRunner>, store: Arc<dyn IssueStore>, config: SyncConfig) -> Self {
        Self { git, store, config }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reconcile `project` (a working copy root) with `<remote>/<branch>`.
    pub async fn sync(&self, project: &Path, branch: &str) -> SyncResult {
        info!(project = %project.display(), branch, "sync started");

        let mut result = SyncResult::started(branch);
        let step = self.run(project, branch, &mut result).await;
        let result = match step {
            Ok((outcome, message)) => result.succeed(outcome, message),
            Err(failure) => result.fail(failure),
        };

        if result.is_success() {
            info!(
                branch,
                outcome = ?result.outcome,
                ahead = result.ahead,
                behind = result.behind,
                "{}",
                result.message
            );
        } else {
            warn!(
                branch,
                code = result.error_code.unwrap_or_default(),
                requires_pull_first = result.requires_pull_first,
                "sync failed: {}",
                result.message
            );
        }
        result
    }

    /// Resolve the working copy for `branch`, then [`sync`](Self::sync) it.
    pub async fn sync_branch(&self, resolver: &dyn WorktreeResolver, branch: &str) -> SyncResult {
        match resolver.resolve(branch).await {
            Some(path) => self.sync(&path, branch).await,
            None => SyncResult::started(branch).fail(SyncFailure::WorktreeNotFound {
                branch: branch.to_string(),
            }),
        }
    }

    /// Report the checked-out branch, divergence from its last fetched
    /// upstream, and uncommitted owned/foreign files. Does not fetch and
    /// changes nothing.
    pub async fn check_branch_status(&self, project: &Path) -> SyncStep<BranchStatus> {
        let branch = self.current_branch(project).await?;
        let upstream = self.upstream(&branch);
        let divergence = self.divergence(project, &upstream).await?;
        let (behind, ahead) = divergence.unwrap_or((0, 0));

        Ok(BranchStatus {
            branch,
            upstream,
            upstream_exists: divergence.is_some(),
            ahead,
            behind,
            owned_files: self.owned_changes(project).await?,
            foreign_files: self.foreign_changes(project).await?,
        })
    }

    // -----------------------------------------------------------------------
    // Protocol
    // -----------------------------------------------------------------------

    async fn run(
        &self,
        project: &Path,
        branch: &str,
        result: &mut SyncResult,
    ) -> SyncStep<(SyncOutcome, String)> {
        let current = self.current_branch(project).await?;
        if current != branch {
            return Err(SyncFailure::WrongBranch {
                expected: branch.to_string(),
                current,
            });
        }

        let fetch = self.git(project, &["fetch", &self.config.remote]).await?;
        if !fetch.success {
            return Err(SyncFailure::FetchFailed {
                stderr: fetch.stderr_trimmed().to_string(),
            });
        }

        let upstream = self.upstream(branch);
        let (behind, ahead) = self.divergence(project, &upstream).await?.unwrap_or((0, 0));
        result.behind = behind;
        result.ahead = ahead;

        let owned = self.owned_changes(project).await?;
        let foreign = self.foreign_changes(project).await?;
        result.has_foreign_changes = !foreign.is_empty();
        result.foreign_files.clone_from(&foreign);
        debug!(behind, ahead, owned = owned.len(), foreign = foreign.len(), "classified changes");

        if behind == 0 {
            if owned.is_empty() {
                return Ok((SyncOutcome::UpToDate, "no issue changes to sync".to_string()));
            }
            self.commit_owned(project).await?;
            self.push(project, branch).await?;
            return Ok((
                SyncOutcome::Pushed,
                format!("pushed {} changed issue file(s)", owned.len()),
            ));
        }

        if !foreign.is_empty() {
            return Err(SyncFailure::ForeignChangesBlocking { files: foreign });
        }

        if owned.is_empty() {
            let ff = self.git(project, &["merge", "--ff-only", &upstream]).await?;
            if !ff.success {
                return Err(SyncFailure::FastForwardFailed {
                    upstream,
                    stderr: ff.stderr_trimmed().to_string(),
                });
            }
            return Ok((
                SyncOutcome::FastForwarded,
                format!("fast-forwarded {behind} commit(s) from {upstream}"),
            ));
        }

        self.stash_merge_push(project, branch, &upstream, result)
            .await?;
        let stats = result.merge_stats.unwrap_or_default();
        Ok((
            SyncOutcome::Merged,
            format!(
                "merged with {upstream}: {} merged, {} from remote, {} local only",
                stats.merged, stats.new_local, stats.new_remote
            ),
        ))
    }

    async fn stash_merge_push(
        &self,
        project: &Path,
        branch: &str,
        upstream: &str,
        result: &mut SyncResult,
    ) -> SyncStep<()> {
        let local = self.store.load_all(project).await?;
        let orig_head = self
            .git_ok(project, &["rev-parse", "HEAD"])
            .await?
            .stdout_trimmed()
            .to_string();

        self.git_ok(
            project,
            &["stash", "push", "--include-untracked", "-m", STASH_MESSAGE, "--", FLEECE_DIR],
        )
        .await?;

        let outcome = self.merge_over_stash(project, upstream, &local, result).await;
        if let Err((failure, undo)) = outcome {
            match undo {
                Undo::PopStash => self.pop_stash(project).await,
                Undo::Rollback => self.rollback(project, &orig_head).await,
            }
            return Err(failure);
        }

        // The merge is committed; a leftover stash entry loses nothing.
        match self.git(project, &["stash", "drop"]).await {
            Ok(out) if out.success => {}
            Ok(out) => warn!(stderr = out.stderr_trimmed(), "could not drop sync stash"),
            Err(err) => warn!(error = %err, "could not drop sync stash"),
        }

        self.push(project, branch).await
    }

    /// Everything between the stash and its drop. Each failure names the
    /// undo that returns the working copy to where the sync started.
    async fn merge_over_stash(
        &self,
        project: &Path,
        upstream: &str,
        local: &[Issue],
        result: &mut SyncResult,
    ) -> Result<(), (SyncFailure, Undo)> {
        let pop = |failure: SyncFailure| (failure, Undo::PopStash);
        let roll_back = |failure: SyncFailure| (failure, Undo::Rollback);

        if self.owned_tracked_changes(project).await.map_err(pop)? {
            let args = ["restore", "--source=HEAD", "--staged", "--worktree", "--", FLEECE_DIR];
            self.git_ok(project, &args).await.map_err(pop)?;
        }

        let ff = self
            .git(project, &["merge", "--ff-only", upstream])
            .await
            .map_err(pop)?;
        if !ff.success {
            self.abort_merge_if_needed(project).await;
            return Err(pop(SyncFailure::FastForwardFailed {
                upstream: upstream.to_string(),
                stderr: ff.stderr_trimmed().to_string(),
            }));
        }

        let remote = self
            .store
            .load_all(project)
            .await
            .map_err(|err| roll_back(err.into()))?;

        let merged = merge_snapshots(local, &remote);
        result.merge_stats = Some(merged.stats);
        debug!(stats = ?merged.stats, "merged issue snapshots");

        self.write_and_commit(project, &merged.issues)
            .await
            .map_err(roll_back)
    }

    /// Save the merged log and commit it. Skips the commit when the merged
    /// log is identical to what the fast-forward brought in.
    async fn write_and_commit(&self, project: &Path, issues: &[Issue]) -> SyncStep<()> {
        self.store.save_all(project, issues).await?;
        self.git_ok(project, &["add", "-A", "--", FLEECE_DIR]).await?;
        if self.owned_changes(project).await?.is_empty() {
            debug!("merged issue log matches upstream; nothing to commit");
            return Ok(());
        }
        let message = self.config.full_commit_message();
        self.git_ok(project, &["commit", "-m", &message, "--", FLEECE_DIR])
            .await?;
        Ok(())
    }

    /// Stage and commit only the owned subtree; foreign changes stay as
    /// they are, staged or not.
    async fn commit_owned(&self, project: &Path) -> SyncStep<()> {
        self.git_ok(project, &["add", "-A", "--", FLEECE_DIR]).await?;
        let message = self.config.full_commit_message();
        self.git_ok(project, &["commit", "-m", &message, "--", FLEECE_DIR])
            .await?;
        Ok(())
    }

    async fn push(&self, project: &Path, branch: &str) -> SyncStep<()> {
        let out = self
            .git(project, &["push", &self.config.remote, branch])
            .await?;
        if out.success {
            Ok(())
        } else {
            Err(classify_push_failure(&out.stderr))
        }
    }

    // -----------------------------------------------------------------------
    // Undo
    // -----------------------------------------------------------------------

    /// Return to `orig_head` and restore the stashed local edits.
    async fn rollback(&self, project: &Path, orig_head: &str) {
        warn!(orig_head, "rolling back sync");
        self.best_effort(project, &["reset", "--hard", orig_head]).await;
        // Untracked owned files written during the merge would block the pop.
        self.best_effort(project, &["clean", "-fd", "--", FLEECE_DIR]).await;
        self.pop_stash(project).await;
    }

    async fn pop_stash(&self, project: &Path) {
        self.best_effort(project, &["stash", "pop"]).await;
    }

    async fn abort_merge_if_needed(&self, project: &Path) {
        let conflicted = self
            .git(project, &["diff", "--name-only", "--diff-filter=U"])
            .await;
        if matches!(&conflicted, Ok(out) if !out.stdout_trimmed().is_empty()) {
            self.best_effort(project, &["merge", "--abort"]).await;
        }
    }

    async fn best_effort(&self, project: &Path, args: &[&str]) {
        match self.git.run(project, args).await {
            Ok(out) if out.success => {}
            Ok(out) => error!(
                command = %args.join(" "),
                stderr = out.stderr_trimmed(),
                "git command failed during sync cleanup"
            ),
            Err(err) => error!(command = %args.join(" "), error = %err, "git unavailable during sync cleanup"),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn upstream(&self, branch: &str) -> String {
        format!("{}/{branch}", self.config.remote)
    }

    async fn current_branch(&self, project: &Path) -> SyncStep<String> {
        let out = self
            .git_ok(project, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(out.stdout_trimmed().to_string())
    }

    /// `(behind, ahead)` relative to `upstream`, or `None` if the upstream
    /// ref does not exist yet.
    async fn divergence(&self, project: &Path, upstream: &str) -> SyncStep<Option<(u32, u32)>> {
        let reference = format!("refs/remotes/{upstream}");
        let exists = self
            .git(project, &["rev-parse", "--verify", "--quiet", &reference])
            .await?;
        if !exists.success {
            return Ok(None);
        }

        let range = format!("{upstream}...HEAD");
        let args = ["rev-list", "--left-right", "--count", range.as_str()];
        let out = self.git_ok(project, &args).await?;
        parse_counts(out.stdout_trimmed())
            .map(Some)
            .ok_or_else(|| SyncFailure::GitCommandFailed {
                command: args.join(" "),
                stderr: format!("unexpected output '{}'", out.stdout_trimmed()),
            })
    }

    async fn owned_changes(&self, project: &Path) -> SyncStep<Vec<String>> {
        let out = self
            .git_ok(
                project,
                &["status", "--porcelain", "-z", "--untracked-files=all", "--", FLEECE_DIR],
            )
            .await?;
        Ok(parse_porcelain(&out.stdout))
    }

    /// Tracked owned files still modified (untracked leftovers are ignored).
    async fn owned_tracked_changes(&self, project: &Path) -> SyncStep<bool> {
        let out = self
            .git_ok(
                project,
                &["status", "--porcelain", "-z", "--untracked-files=no", "--", FLEECE_DIR],
            )
            .await?;
        Ok(!parse_porcelain(&out.stdout).is_empty())
    }

    async fn foreign_changes(&self, project: &Path) -> SyncStep<Vec<String>> {
        let out = self
            .git_ok(
                project,
                &[
                    "status",
                    "--porcelain",
                    "-z",
                    "--untracked-files=all",
                    "--",
                    ".",
                    FOREIGN_EXCLUDE,
                ],
            )
            .await?;
        Ok(parse_porcelain(&out.stdout))
    }

    async fn git(&self, project: &Path, args: &[&str]) -> SyncStep<GitOutput> {
        Ok(self.git.run(project, args).await?)
    }

    async fn git_ok(&self, project: &Path, args: &[&str]) -> SyncStep<GitOutput> {
        let out = self.git(project, args).await?;
        if out.success {
            Ok(out)
        } else {
            Err(command_failed(args, &out))
        }
    }
}

fn command_failed(args: &[&str], out: &GitOutput) -> SyncFailure {
    SyncFailure::GitCommandFailed {
        command: args.join(" "),
        stderr: out.stderr_trimmed().to_string(),
    }
}

/// Parse `rev-list --left-right --count` output into `(left, right)`.
fn parse_counts(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    Some((left, right))
}

/// A rejected non-fast-forward push means the remote moved; anything else
/// is an opaque push failure.
fn classify_push_failure(stderr: &str) -> SyncFailure {
    let stderr = stderr.trim().to_string();
    if stderr.contains("[rejected]")
        || stderr.contains("non-fast-forward")
        || stderr.contains("fetch first")
    {
        SyncFailure::PushRejected { stderr }
    } else {
        SyncFailure::PushFailed { stderr }
    }
}
