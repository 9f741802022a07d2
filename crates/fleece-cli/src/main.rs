#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use fleece_core::config::resolve_config;
use output::OutputMode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "fleece: git-backed issue tracking with field-level sync",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Override actor identity (skips env and config resolution).
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Lifecycle",
        about = "Create a new issue",
        after_help = "EXAMPLES:\n    # Create a task\n    fleece create --title \"Fix login timeout\"\n\n    # Create a bug under a parent\n    fleece create --title \"Crash on save\" --type bug --parent fl-a1b2c3"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Update fields of an issue",
        after_help = "EXAMPLES:\n    # Start work\n    fleece update fl-a1b2c3 --status progress\n\n    # Reassign and tag\n    fleece update fl-a1b2c3 --assign bob --tag backend"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Soft-delete an issue",
        after_help = "EXAMPLES:\n    fleece delete fl-a1b2c3"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one issue",
        after_help = "EXAMPLES:\n    fleece show fl-a1b2c3\n    fleece show fl-a1b2c3 --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "List issues",
        after_help = "EXAMPLES:\n    # Open issues (default)\n    fleece list\n\n    # Everything, including completed and deleted\n    fleece list --all\n\n    # Children of an issue, in order\n    fleece list --parent fl-a1b2c3"
    )]
    List(cmd::list::ListArgs),

    #[command(next_help_heading = "Hierarchy", about = "Edit parent links")]
    Parent {
        #[command(subcommand)]
        command: cmd::parent::ParentCommand,
    },

    #[command(
        next_help_heading = "Sync",
        about = "Synchronize issues with the remote",
        long_about = "Fetch, merge issue changes field by field and push. Only files under .fleece/ are ever committed.",
        after_help = "EXAMPLES:\n    # Sync the checked-out branch\n    fleece sync\n\n    # Sync whichever worktree has 'main' checked out\n    fleece sync --branch main"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        next_help_heading = "Sync",
        about = "Show divergence and uncommitted changes",
        long_about = "Report ahead/behind counts against the last fetched upstream and uncommitted files, split into .fleece/ and everything else. Does not fetch."
    )]
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLEECE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "fleece=debug,fleece_core=debug,info"
        } else {
            "fleece=info,fleece_core=info,warn"
        })
    });

    let format = env::var("FLEECE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let project_root = env::current_dir()?;
    let config = resolve_config(&project_root, cli.json)?;
    let actor = actor::resolve_actor(cli.actor.as_deref(), config.user.actor.as_deref());
    debug!(actor = %actor, output = %config.resolved_output, "resolved configuration");

    let ctx = cmd::Context {
        output: OutputMode::from_resolved(&config.resolved_output),
        project_root,
        actor,
        config: config.project,
    };

    match cli.command {
        Commands::Create(args) => cmd::create::run_create(args, &ctx).await,
        Commands::Update(args) => cmd::update::run_update(args, &ctx).await,
        Commands::Delete(args) => cmd::delete::run_delete(&args, &ctx).await,
        Commands::Show(args) => cmd::show::run_show(&args, &ctx).await,
        Commands::List(args) => cmd::list::run_list(&args, &ctx).await,
        Commands::Parent { command } => cmd::parent::run_parent(&command, &ctx).await,
        Commands::Sync(args) => cmd::sync::run_sync(&args, &ctx).await,
        Commands::Status => cmd::status::run_status(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let cli = Cli::parse_from(["fleece", "--json", "list"]);
        assert!(cli.json);
        let cli = Cli::parse_from(["fleece", "list", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn actor_flag_parsed() {
        let cli = Cli::parse_from(["fleece", "--actor", "alice", "delete", "fl-abc123"]);
        assert_eq!(cli.actor.as_deref(), Some("alice"));

        let cli = Cli::parse_from(["fleece", "list"]);
        assert!(cli.actor.is_none());
    }

    #[test]
    fn all_subcommands_parse() {
        let subcommands = [
            vec!["fleece", "create", "--title", "x"],
            vec!["fleece", "create", "--title", "x", "--type", "bug", "--parent", "fl-1"],
            vec!["fleece", "update", "fl-1", "--status", "progress"],
            vec!["fleece", "delete", "fl-1"],
            vec!["fleece", "show", "fl-1"],
            vec!["fleece", "list", "--all"],
            vec!["fleece", "parent", "set", "fl-1", "fl-2", "--replace"],
            vec!["fleece", "parent", "add", "fl-1", "fl-2"],
            vec!["fleece", "parent", "remove", "fl-1", "fl-2"],
            vec!["fleece", "sync"],
            vec!["fleece", "sync", "--branch", "main"],
            vec!["fleece", "status"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn invalid_enum_values_are_rejected() {
        assert!(Cli::try_parse_from(["fleece", "create", "--title", "x", "--type", "epic"]).is_err());
        assert!(Cli::try_parse_from(["fleece", "update", "fl-1", "--status", "doing"]).is_err());
    }
}
