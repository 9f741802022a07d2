//! `fleece parent`: edit the parent links of an issue.
//!
//! Setting or adding a parent that is already a descendant of the child is
//! refused with a cycle error; removing a link never is.

use super::{Context, mutate};
use crate::cmd::show::print_issue;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum ParentCommand {
    #[command(
        about = "Set the parent of an issue",
        after_help = "EXAMPLES:\n    # Add fl-b as a parent, keeping existing ones\n    fleece parent set fl-a fl-b\n\n    # Make fl-b the only parent\n    fleece parent set fl-a fl-b --replace"
    )]
    Set {
        child: String,
        parent: String,
        /// Drop all other parents.
        #[arg(long)]
        replace: bool,
    },

    #[command(about = "Add another parent to an issue")]
    Add { child: String, parent: String },

    #[command(about = "Remove a parent link")]
    Remove { child: String, parent: String },
}

pub async fn run_parent(command: &ParentCommand, ctx: &Context) -> anyhow::Result<()> {
    let root = &ctx.project_root;
    let actor = ctx.actor.as_str();
    let (verb, issue) = match command {
        ParentCommand::Set {
            child,
            parent,
            replace,
        } => (
            "Re-parented",
            mutate(ctx, |service| async move {
                service.set_parent(root, child, parent, *replace, actor).await
            })
            .await?,
        ),
        ParentCommand::Add { child, parent } => (
            "Added parent to",
            mutate(ctx, |service| async move {
                service.add_parent(root, child, parent, actor).await
            })
            .await?,
        ),
        ParentCommand::Remove { child, parent } => (
            "Removed parent from",
            mutate(ctx, |service| async move {
                service.remove_parent(root, child, parent, actor).await
            })
            .await?,
        ),
    };
    print_issue(ctx.output, verb, &issue)
}
