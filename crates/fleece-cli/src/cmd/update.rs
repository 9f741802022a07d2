//! `fleece update`: edit fields of an existing issue.

use super::{Context, mutate, split_list};
use crate::cmd::show::print_issue;
use crate::output::{CliError, render_error};
use clap::Args;
use fleece_core::model::{ExecutionMode, IssueType, Status};
use fleece_core::service::IssueUpdate;

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Issue id.
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    /// open, progress, review, complete, archived, closed or deleted.
    #[arg(long)]
    pub status: Option<Status>,

    #[arg(long = "type")]
    pub issue_type: Option<IssueType>,

    /// New assignee.
    #[arg(long, conflicts_with = "unassign")]
    pub assign: Option<String>,

    /// Clear the assignee.
    #[arg(long)]
    pub unassign: bool,

    /// Pull request number linked to this issue.
    #[arg(long, conflicts_with = "unlink_pr")]
    pub pr: Option<u64>,

    /// Clear the linked pull request.
    #[arg(long)]
    pub unlink_pr: bool,

    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(short, long)]
    pub priority: Option<u8>,

    #[arg(long)]
    pub execution_mode: Option<ExecutionMode>,

    /// Tags to add (comma-separated or repeated).
    #[arg(long)]
    pub tag: Vec<String>,

    /// Related issue ids to link (comma-separated or repeated).
    #[arg(long)]
    pub link: Vec<String>,
}

impl UpdateArgs {
    fn to_update(&self) -> IssueUpdate {
        IssueUpdate {
            title: self.title.clone(),
            status: self.status,
            issue_type: self.issue_type,
            assigned_to: if self.unassign {
                Some(None)
            } else {
                self.assign.clone().map(Some)
            },
            linked_pr: if self.unlink_pr {
                Some(None)
            } else {
                self.pr.map(Some)
            },
            description: self.description.clone(),
            priority: self.priority,
            execution_mode: self.execution_mode,
            add_tags: split_list(&self.tag),
            add_linked_issues: split_list(&self.link),
        }
    }
}

pub async fn run_update(args: UpdateArgs, ctx: &Context) -> anyhow::Result<()> {
    let update = args.to_update();
    if update.is_empty() {
        let err = CliError::new("nothing to update; pass at least one field flag");
        render_error(ctx.output, &err)?;
        anyhow::bail!("{}", err.message);
    }

    let id = args.id;
    let issue = mutate(ctx, |service| async move {
        service
            .update_issue(&ctx.project_root, &id, update, &ctx.actor)
            .await
    })
    .await?;
    print_issue(ctx.output, "Updated", &issue)
}
