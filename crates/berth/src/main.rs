//! `berth`: keep named scripts per project and run them with live output

use anyhow::Result;
use clap::{Parser, Subcommand};
use project_store::ShellKind;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

mod commands;

use commands::CliContext;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Berth - store project scripts and run them with live output")]
#[command(version)]
struct Cli {
    /// Settings file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the project database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Manage containers of a project
    Container {
        #[command(subcommand)]
        command: ContainerCommands,
    },

    /// Manage and run commands of a project
    Command {
        #[command(subcommand)]
        command: CommandCommands,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Add a project, or move an existing one to a new root
    Add {
        /// Project name
        name: String,

        /// Working directory (default: the configured default root)
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// List projects
    List,

    /// Remove a project with its containers and commands
    Rm {
        /// Project name
        name: String,
    },
}

#[derive(Subcommand)]
enum ContainerCommands {
    /// Add a container, or change its shell
    Add {
        /// Project name
        project: String,

        /// Container name
        name: String,

        /// Shell type (bash, zsh, sh)
        #[arg(short, long)]
        shell: Option<ShellKind>,
    },

    /// List containers of a project
    List {
        /// Project name
        project: String,
    },

    /// Remove a container; its commands are kept and become unscoped
    Rm {
        /// Project name
        project: String,

        /// Container name
        name: String,
    },
}

#[derive(Subcommand)]
enum CommandCommands {
    /// Add a command, or replace its script
    Add {
        /// Project name
        project: String,

        /// Command name
        name: String,

        /// Script handed to the shell
        #[arg(short, long)]
        script: String,

        /// Scope the command to a container
        #[arg(long)]
        container: Option<String>,
    },

    /// List commands of a project
    List {
        /// Project name
        project: String,

        /// Only commands scoped to this container
        #[arg(long)]
        container: Option<String>,
    },

    /// Remove a command
    Rm {
        /// Project name
        project: String,

        /// Command name
        name: String,
    },

    /// Run a command and stream its output
    Run {
        /// Project name
        project: String,

        /// Command name
        name: String,

        /// Cancel the run after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings
    Show,

    /// Change settings
    Set {
        /// Shell for commands outside any container
        #[arg(long)]
        default_shell: Option<ShellKind>,

        /// Root for new projects
        #[arg(long)]
        default_root: Option<PathBuf>,

        /// Grace period before a cancelled run is killed
        #[arg(long)]
        termination_grace_ms: Option<u64>,

        /// Source shell profile files before each run
        #[arg(long)]
        source_profiles: Option<bool>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = CliContext::load(cli.config, cli.data_dir)?;

    match cli.command {
        Commands::Project { command } => commands::project::run(&ctx, command)?,
        Commands::Container { command } => commands::container::run(&ctx, command)?,
        Commands::Command { command } => return commands::command::run(&ctx, command),
        Commands::Config { command } => commands::config::run(&ctx, command)?,
    }
    Ok(ExitCode::SUCCESS)
}
