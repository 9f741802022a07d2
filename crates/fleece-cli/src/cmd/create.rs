//! `fleece create`: create a new issue.

use super::{Context, mutate, split_list};
use crate::cmd::show::print_issue;
use clap::Args;
use fleece_core::model::{ExecutionMode, IssueType};
use fleece_core::service::NewIssue;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Title of the new issue.
    #[arg(short, long)]
    pub title: String,

    /// Issue type: task, bug, chore, feature, idea or verify.
    #[arg(long = "type", default_value = "task")]
    pub issue_type: IssueType,

    /// Description text.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Priority, lower is more urgent.
    #[arg(short, long)]
    pub priority: Option<u8>,

    /// How children are worked: series or parallel.
    #[arg(long)]
    pub execution_mode: Option<ExecutionMode>,

    /// Assignee.
    #[arg(long)]
    pub assign: Option<String>,

    /// Tags to attach (comma-separated or repeated).
    #[arg(long)]
    pub tag: Vec<String>,

    /// Parent issue id; the new issue is appended after its siblings.
    #[arg(long)]
    pub parent: Option<String>,
}

impl CreateArgs {
    fn into_new_issue(self) -> NewIssue {
        let mut new = NewIssue::new(self.title, self.issue_type);
        new.description = self.description;
        new.priority = self.priority;
        new.execution_mode = self.execution_mode;
        new.assigned_to = self.assign;
        new.tags = split_list(&self.tag).into_iter().collect();
        new.parent = self.parent;
        new
    }
}

pub async fn run_create(args: CreateArgs, ctx: &Context) -> anyhow::Result<()> {
    let new = args.into_new_issue();
    let issue = mutate(ctx, |service| async move {
        service
            .create_issue(&ctx.project_root, new, &ctx.actor)
            .await
    })
    .await?;
    print_issue(ctx.output, "Created", &issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: CreateArgs,
    }

    #[test]
    fn create_args_defaults() {
        let w = Wrapper::parse_from(["test", "--title", "Hello"]);
        assert_eq!(w.args.title, "Hello");
        assert_eq!(w.args.issue_type, IssueType::Task);
        assert!(w.args.parent.is_none());
        assert!(w.args.tag.is_empty());
    }

    #[test]
    fn tags_are_split_into_a_set() {
        let w = Wrapper::parse_from([
            "test", "--title", "T", "--tag", "ui,backend", "--tag", "ui", "--type", "bug",
        ]);
        let new = w.args.into_new_issue();
        assert_eq!(new.issue_type, IssueType::Bug);
        assert_eq!(
            new.tags.into_iter().collect::<Vec<_>>(),
            vec!["backend", "ui"]
        );
    }
}
