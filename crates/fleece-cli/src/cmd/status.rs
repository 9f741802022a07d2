//! `fleece status`: divergence and uncommitted changes, without fetching.

use super::Context;
use crate::output::{CliError, pretty_kv, pretty_section, render_error, render_mode};
use fleece_core::store::JsonlIssueStore;
use fleece_core::sync::{BranchStatus, ProcessGit, SyncEngine};
use std::io::{self, Write};
use std::sync::Arc;

pub async fn run_status(ctx: &Context) -> anyhow::Result<()> {
    let engine = SyncEngine::new(
        Arc::new(ProcessGit),
        Arc::new(JsonlIssueStore::new()),
        ctx.config.sync.clone(),
    );
    let status = match engine.check_branch_status(&ctx.project_root).await {
        Ok(status) => status,
        Err(failure) => {
            render_error(ctx.output, &CliError::from(&failure))?;
            anyhow::bail!("{failure}");
        }
    };
    render_mode(ctx.output, &status, write_text, write_pretty)
}

fn write_text(status: &BranchStatus, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\tbehind={}\tahead={}",
        status.branch, status.upstream, status.behind, status.ahead
    )?;
    for file in &status.owned_files {
        writeln!(w, "owned\t{file}")?;
    }
    for file in &status.foreign_files {
        writeln!(w, "foreign\t{file}")?;
    }
    Ok(())
}

fn write_pretty(status: &BranchStatus, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Branch {}", status.branch))?;
    if status.upstream_exists {
        pretty_kv(w, "Upstream", &status.upstream)?;
        pretty_kv(w, "Behind", status.behind.to_string())?;
        pretty_kv(w, "Ahead", status.ahead.to_string())?;
    } else {
        pretty_kv(w, "Upstream", format!("{} (not fetched yet)", status.upstream))?;
    }
    pretty_kv(w, "Issues", if status.has_owned_changes() { "uncommitted changes" } else { "clean" })?;
    if status.has_foreign_changes() {
        writeln!(w, "Other uncommitted files:")?;
        for file in &status.foreign_files {
            writeln!(w, "  {file}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BranchStatus {
        BranchStatus {
            branch: "main".into(),
            upstream: "origin/main".into(),
            upstream_exists: true,
            ahead: 0,
            behind: 3,
            owned_files: vec![".fleece/issues.jsonl".into()],
            foreign_files: vec!["notes.md".into()],
        }
    }

    #[test]
    fn text_lists_owned_and_foreign() {
        let mut buf = Vec::new();
        write_text(&sample(), &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "main\torigin/main\tbehind=3\tahead=0\nowned\t.fleece/issues.jsonl\nforeign\tnotes.md\n"
        );
    }

    #[test]
    fn pretty_flags_missing_upstream() {
        let mut status = sample();
        status.upstream_exists = false;
        status.foreign_files.clear();
        let mut buf = Vec::new();
        write_pretty(&status, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("origin/main (not fetched yet)"));
        assert!(text.contains("uncommitted changes"));
        assert!(!text.contains("Behind"));
    }
}
