//! `fleece sync`: reconcile `.fleece/` with the remote branch.

use super::Context;
use crate::output::{CliError, pretty_kv, render_error, render_mode};
use clap::Args;
use fleece_core::store::JsonlIssueStore;
use fleece_core::sync::{
    GitRunner, GitWorktrees, ProcessGit, SyncEngine, SyncOutcome, SyncResult, WorktreeResolver,
};
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Branch to sync. Defaults to the checked-out branch; otherwise the
    /// worktree that has this branch checked out is synced.
    #[arg(long)]
    pub branch: Option<String>,
}

pub async fn run_sync(args: &SyncArgs, ctx: &Context) -> anyhow::Result<()> {
    let git: Arc<dyn GitRunner> = Arc::new(ProcessGit);
    let engine = SyncEngine::new(
        Arc::clone(&git),
        Arc::new(JsonlIssueStore::new()),
        ctx.config.sync.clone(),
    );

    let result = match &args.branch {
        Some(branch) => {
            let worktrees = GitWorktrees::new(Arc::clone(&git), &ctx.project_root);
            match worktrees.resolve(branch).await {
                Some(path) => {
                    let _lock = ctx.lock_worktree(&path).await?;
                    engine.sync(&path, branch).await
                }
                None => engine.sync_branch(&worktrees, branch).await,
            }
        }
        None => {
            let branch = current_branch(git.as_ref(), ctx).await?;
            let _lock = ctx.lock_worktree(&ctx.project_root).await?;
            engine.sync(&ctx.project_root, &branch).await
        }
    };

    render_mode(ctx.output, &result, write_text, write_pretty)?;

    match &result.error {
        None => Ok(()),
        Some(failure) => {
            render_error(ctx.output, &CliError::from(failure))?;
            anyhow::bail!("{failure}")
        }
    }
}

async fn current_branch(git: &dyn GitRunner, ctx: &Context) -> anyhow::Result<String> {
    let out = git
        .run(&ctx.project_root, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .map_err(|e| ctx.fail(&e))?;
    if !out.success {
        let err = CliError::new(format!(
            "cannot determine the current branch: {}",
            out.stderr_trimmed()
        ));
        render_error(ctx.output, &err)?;
        anyhow::bail!("{}", err.message);
    }
    Ok(out.stdout_trimmed().to_string())
}

fn outcome_label(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::UpToDate => "up-to-date",
        SyncOutcome::Pushed => "pushed",
        SyncOutcome::FastForwarded => "fast-forwarded",
        SyncOutcome::Merged => "merged",
        SyncOutcome::Failed => "failed",
    }
}

fn write_text(result: &SyncResult, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\tbehind={}\tahead={}",
        outcome_label(result.outcome),
        result.branch,
        result.behind,
        result.ahead
    )?;
    for file in &result.foreign_files {
        writeln!(w, "foreign\t{file}")?;
    }
    Ok(())
}

fn write_pretty(result: &SyncResult, w: &mut dyn Write) -> io::Result<()> {
    let mark = if result.is_success() { "✓" } else { "✗" };
    writeln!(w, "{mark} fleece sync ({})", result.branch)?;
    pretty_kv(w, "Outcome", outcome_label(result.outcome))?;
    pretty_kv(w, "Behind", result.behind.to_string())?;
    pretty_kv(w, "Ahead", result.ahead.to_string())?;
    if let Some(stats) = result.merge_stats {
        pretty_kv(
            w,
            "Merged",
            format!(
                "{} merged, {} from remote, {} local only, {} unchanged",
                stats.merged, stats.new_local, stats.new_remote, stats.identical
            ),
        )?;
    }
    if result.has_foreign_changes {
        writeln!(w, "Uncommitted changes outside .fleece/ (left untouched):")?;
        for file in &result.foreign_files {
            writeln!(w, "  {file}")?;
        }
    }
    if result.is_success() {
        writeln!(w, "{}", result.message)?;
    }
    Ok(())
}
