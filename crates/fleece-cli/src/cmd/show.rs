//! `fleece show`: full details of one issue, plus its children.

use super::Context;
use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};
use clap::Args;
use fleece_core::model::Issue;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Issue id.
    pub id: String,
}

#[derive(Serialize)]
struct ShowView<'a> {
    #[serde(flatten)]
    issue: &'a Issue,
    children: Vec<ChildView<'a>>,
}

#[derive(Serialize)]
struct ChildView<'a> {
    id: &'a str,
    title: &'a str,
    status: String,
}

pub async fn run_show(args: &ShowArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.open_service();
    let issue = service
        .get(&ctx.project_root, &args.id)
        .await
        .map_err(|e| ctx.fail(&e))?;
    let children = service
        .children(&ctx.project_root, &args.id)
        .await
        .map_err(|e| ctx.fail(&e))?;

    let view = ShowView {
        issue: &issue,
        children: children
            .iter()
            .map(|c| ChildView {
                id: &c.id,
                title: &c.title.value,
                status: c.status.value.to_string(),
            })
            .collect(),
    };

    render_mode(
        ctx.output,
        &view,
        |v, w| {
            write_issue_text(v.issue, w)?;
            for child in &v.children {
                writeln!(w, "child\t{}\t{}\t{}", child.id, child.status, child.title)?;
            }
            Ok(())
        },
        |v, w| {
            write_issue_pretty(v.issue, w)?;
            if !v.children.is_empty() {
                writeln!(w)?;
                pretty_section(w, "Children")?;
                for child in &v.children {
                    writeln!(w, "  {:<10} {:<9} {}", child.id, child.status, child.title)?;
                }
            }
            Ok(())
        },
    )
}

/// Print a mutated issue: JSON object, or a one-line confirmation.
pub fn print_issue(mode: OutputMode, verb: &str, issue: &Issue) -> anyhow::Result<()> {
    render_mode(
        mode,
        issue,
        |i, w| writeln!(w, "{}\t{}\t{}", i.id, i.status.value, i.title.value),
        |i, w| writeln!(w, "✓ {verb} {}: {}", i.id, i.title.value),
    )
}

fn write_issue_text(issue: &Issue, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "id\t{}", issue.id)?;
    writeln!(w, "title\t{}", issue.title.value)?;
    writeln!(w, "status\t{}", issue.status.value)?;
    writeln!(w, "type\t{}", issue.issue_type.value)?;
    if let Some(assignee) = &issue.assigned_to.value {
        writeln!(w, "assigned\t{assignee}")?;
    }
    if let Some(pr) = issue.linked_pr.value {
        writeln!(w, "pr\t{pr}")?;
    }
    if let Some(priority) = issue.priority {
        writeln!(w, "priority\t{priority}")?;
    }
    for parent in issue.parent_ids() {
        writeln!(w, "parent\t{parent}")?;
    }
    Ok(())
}

fn write_issue_pretty(issue: &Issue, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("{}  {}", issue.id, issue.title.value))?;
    pretty_kv(w, "Status", issue.status.value.to_string())?;
    pretty_kv(w, "Type", issue.issue_type.value.to_string())?;
    if let Some(assignee) = &issue.assigned_to.value {
        pretty_kv(w, "Assigned", assignee)?;
    }
    if let Some(pr) = issue.linked_pr.value {
        pretty_kv(w, "PR", format!("#{pr}"))?;
    }
    if let Some(priority) = issue.priority {
        pretty_kv(w, "Priority", priority.to_string())?;
    }
    if let Some(mode) = issue.execution_mode {
        pretty_kv(w, "Execution", mode.to_string())?;
    }
    if !issue.tags.is_empty() {
        let tags: Vec<&str> = issue.tags.iter().map(String::as_str).collect();
        pretty_kv(w, "Tags", tags.join(", "))?;
    }
    if !issue.parent_issues.is_empty() {
        let parents: Vec<&str> = issue.parent_ids().collect();
        pretty_kv(w, "Parents", parents.join(", "))?;
    }
    if !issue.linked_issues.is_empty() {
        let linked: Vec<&str> = issue.linked_issues.iter().map(String::as_str).collect();
        pretty_kv(w, "Linked", linked.join(", "))?;
    }
    pretty_kv(
        w,
        "Created",
        format!("{} by {}", issue.created_at.format("%Y-%m-%d %H:%M"), issue.created_by),
    )?;
    pretty_kv(
        w,
        "Updated",
        issue.last_update().format("%Y-%m-%d %H:%M").to_string(),
    )?;
    if let Some(description) = &issue.description {
        pretty_rule(w)?;
        writeln!(w, "{description}")?;
    }
    Ok(())
}
