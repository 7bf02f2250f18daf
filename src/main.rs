use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Run Claude CLI prompt chains as cached, resumable workflows")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not echo the external tool's output while it runs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Claude CLI command. Overrides conductor.toml and CLAUDE_CMD.
    #[arg(long, global = true)]
    pub claude_cmd: Option<String>,

    /// Bypass the result cache for this invocation
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Also write logs to .conductor/logs/<name>
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more workflows (several run concurrently)
    Run {
        /// Workflow files or names under .conductor/workflows
        #[arg(required = true)]
        workflows: Vec<String>,

        /// Text substituted for $ARGUMENTS
        #[arg(short, long, default_value = "")]
        arguments: String,

        /// Named parameter, KEY=VALUE (repeatable)
        #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Print the run record as JSON instead of the labeled output
        #[arg(long)]
        json: bool,
    },
    /// Resume a failed run from the step it stopped at
    Resume {
        /// Workflow file or name
        workflow: String,

        /// Run id or prefix (defaults to the latest resumable run of the workflow)
        #[arg(long)]
        run: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Invoke the Claude CLI once with a prompt
    Invoke {
        prompt: String,

        /// Allowed capabilities, comma-separated (e.g. Read,Grep)
        #[arg(short, long, value_delimiter = ',')]
        capabilities: Vec<String>,

        /// Reasoning level: none, light, moderate, heavy, maximum
        #[arg(short, long, default_value = "none")]
        reasoning: String,

        /// Timeout in seconds for this invocation (0 for no limit)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Check workflow files without running anything
    Validate {
        #[arg(required = true)]
        workflows: Vec<String>,
    },
    /// List past runs, or show one
    History {
        #[command(subcommand)]
        command: Option<HistoryCommands>,

        /// Maximum number of runs to list
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum HistoryCommands {
    /// Show one run in full
    Show {
        /// Run id or prefix
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum CacheCommands {
    /// Remove every cached result
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Remove expired results only
    Purge,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default conductor.toml file
    Init,
}

/// Install the tracing subscriber. The returned guard flushes the file
/// writer and must live until exit.
fn init_tracing(
    cli: &Cli,
    project_dir: &std::path::Path,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_filter = if cli.verbose {
        "conductor=debug"
    } else {
        "conductor=info"
    };
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter());

    match &cli.log_file {
        Some(name) => {
            let log_dir = project_dir.join(conductor::config::STATE_DIR).join("logs");
            std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
            let appender = tracing_appender::rolling::never(&log_dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let _log_guard = init_tracing(&cli, &project_dir)?;

    match &cli.command {
        Commands::Run {
            workflows,
            arguments,
            params,
            json,
        } => {
            cmd::cmd_run(&cli, &project_dir, workflows, arguments, params, *json).await?;
        }
        Commands::Resume {
            workflow,
            run,
            json,
        } => {
            cmd::cmd_resume(&cli, &project_dir, workflow, run.as_deref(), *json).await?;
        }
        Commands::Invoke {
            prompt,
            capabilities,
            reasoning,
            timeout,
        } => {
            cmd::cmd_invoke(&cli, &project_dir, prompt, capabilities, reasoning, *timeout).await?;
        }
        Commands::Validate { workflows } => cmd::cmd_validate(&project_dir, workflows)?,
        Commands::History { command, limit } => {
            cmd::cmd_history(&project_dir, command.clone(), *limit)?
        }
        Commands::Cache { command } => cmd::cmd_cache(&cli, &project_dir, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
