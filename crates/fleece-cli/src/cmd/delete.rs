//! `fleece delete`: soft-delete an issue.
//!
//! The issue stays in the log with status `deleted` so the deletion syncs
//! like any other field edit.

use super::{Context, mutate};
use crate::cmd::show::print_issue;
use clap::Args;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Issue id.
    pub id: String,
}

pub async fn run_delete(args: &DeleteArgs, ctx: &Context) -> anyhow::Result<()> {
    let issue = mutate(ctx, |service| async move {
        service
            .delete_issue(&ctx.project_root, &args.id, &ctx.actor)
            .await
    })
    .await?;
    print_issue(ctx.output, "Deleted", &issue)
}
