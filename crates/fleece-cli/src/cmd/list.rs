//! `fleece list`: list issues with optional filters.

use super::Context;
use crate::output::{Renderable, render_list};
use clap::Args;
use fleece_core::model::{Issue, IssueType, Status};
use std::io::{self, Write};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Include completed, archived, closed and deleted issues.
    #[arg(short, long)]
    pub all: bool,

    /// Only issues with this status (implies --all for terminal statuses).
    #[arg(long)]
    pub status: Option<Status>,

    #[arg(long = "type")]
    pub issue_type: Option<IssueType>,

    /// Only issues assigned to this actor.
    #[arg(long)]
    pub assigned: Option<String>,

    /// Children of this issue, in their sort order.
    #[arg(long)]
    pub parent: Option<String>,
}

impl ListArgs {
    fn matches(&self, issue: &Issue) -> bool {
        if let Some(status) = self.status {
            if issue.status.value != status {
                return false;
            }
        } else if !self.all && issue.is_terminal() {
            return false;
        }
        if self.issue_type.is_some_and(|t| issue.issue_type.value != t) {
            return false;
        }
        if let Some(assigned) = &self.assigned {
            if issue.assigned_to.value.as_deref() != Some(assigned.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One row of list output.
struct IssueRow(Issue);

impl Renderable for IssueRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let issue = &self.0;
        let assignee = issue
            .assigned_to
            .value
            .as_deref()
            .map(|a| format!("  @{a}"))
            .unwrap_or_default();
        writeln!(
            w,
            "{:<10} {:<9} {:<8} {}{assignee}",
            issue.id, issue.status.value, issue.issue_type.value, issue.title.value
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, &self.0)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let issue = &self.0;
        writeln!(
            w,
            "{}  {}  {}  {}",
            issue.id, issue.status.value, issue.issue_type.value, issue.title.value
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "TYPE", "TITLE"]
    }
}

pub async fn run_list(args: &ListArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.open_service();
    let issues = match &args.parent {
        Some(parent) => service.children(&ctx.project_root, parent).await,
        None => service.list(&ctx.project_root, true).await,
    }
    .map_err(|e| ctx.fail(&e))?;

    let rows: Vec<IssueRow> = issues
        .into_iter()
        .filter(|issue| args.matches(issue))
        .map(IssueRow)
        .collect();
    render_list(&rows, ctx.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn issue(status: Status, issue_type: IssueType) -> Issue {
        let mut issue = Issue::new("fl-000001", "T", issue_type, Utc::now(), "alice");
        issue.status.value = status;
        issue
    }

    #[test]
    fn terminal_issues_hidden_by_default() {
        let args = ListArgs::default();
        assert!(args.matches(&issue(Status::Open, IssueType::Task)));
        assert!(!args.matches(&issue(Status::Complete, IssueType::Task)));
        assert!(!args.matches(&issue(Status::Deleted, IssueType::Task)));

        let all = ListArgs {
            all: true,
            ..ListArgs::default()
        };
        assert!(all.matches(&issue(Status::Deleted, IssueType::Task)));
    }

    #[test]
    fn explicit_status_shows_terminal_issues() {
        let args = ListArgs {
            status: Some(Status::Closed),
            ..ListArgs::default()
        };
        assert!(args.matches(&issue(Status::Closed, IssueType::Task)));
        assert!(!args.matches(&issue(Status::Open, IssueType::Task)));
    }

    #[test]
    fn type_and_assignee_filters() {
        let args = ListArgs {
            issue_type: Some(IssueType::Bug),
            assigned: Some("bob".into()),
            ..ListArgs::default()
        };
        let mut bug = issue(Status::Open, IssueType::Bug);
        assert!(!args.matches(&bug));
        bug.assigned_to.value = Some("bob".into());
        assert!(args.matches(&bug));
        let mut task = issue(Status::Open, IssueType::Task);
        task.assigned_to.value = Some("bob".into());
        assert!(!args.matches(&task));
    }

    #[test]
    fn table_row_matches_headers() {
        let mut buf = Vec::new();
        IssueRow(issue(Status::Review, IssueType::Idea))
            .render_table(&mut buf)
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "fl-000001  review  idea  T\n");
    }
}
