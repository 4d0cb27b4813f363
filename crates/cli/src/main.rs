use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vstask_core::execution::TaskRunnerConfig;
use vstask_core::process::PtyMode;
use vstask_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};

mod commands;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "VSTASK_LOG";

/// vstask - Run editor tasks.json tasks from the terminal
#[derive(Parser)]
#[command(name = "vstask")]
#[command(about = "Run .vscode/tasks.json tasks from the terminal")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Directory to start searching for the project root from
    #[arg(short, long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Never run tasks under a pseudo-terminal
    #[arg(long, global = true)]
    no_pty: bool,

    /// Always run tasks under a pseudo-terminal
    #[arg(long, global = true)]
    force_pty: bool,

    /// Task to run; a picker is shown when omitted
    label: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task after its dependencies
    Run {
        /// Task label; a picker is shown when omitted
        label: Option<String>,
    },
    /// List the tasks of the project
    List,
    /// Show the order tasks would start in without running them
    Plan {
        /// Task label
        label: String,
    },
    /// Show the task dependency graph
    Graph,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let manager = WorkspaceManager::new(WorkspaceManagerConfig {
        start_dir: cli.dir.clone(),
    })
    .map_err(|e| anyhow::anyhow!("Failed to load tasks: {}", e))?;

    match cli.command {
        Some(Commands::List) => commands::list::execute(&manager),
        Some(Commands::Plan { label }) => commands::plan::execute(&manager, &label),
        Some(Commands::Graph) => commands::graph::execute(&manager),
        Some(Commands::Run { label }) => {
            let config = runner_config(cli.force_pty, cli.no_pty);
            commands::run::execute(&manager, label, config).await
        }
        None => {
            let config = runner_config(cli.force_pty, cli.no_pty);
            commands::run::execute(&manager, cli.label, config).await
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Runner configuration from the environment; command-line flags take
/// precedence over `VSTASK_FORCE_PTY` and `VSTASK_DISABLE_PTY`.
fn runner_config(force_pty: bool, no_pty: bool) -> TaskRunnerConfig {
    let mut config = TaskRunnerConfig::from_env();
    if force_pty || no_pty {
        config.process.pty = PtyMode::from_flags(force_pty, no_pty);
    }
    config
}
