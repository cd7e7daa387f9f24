//! Command-line parsing and dispatch
//!
//! `main.rs` only loads `.env` and calls `cli::run()`.

pub mod config;
pub mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "instantly")]
#[command(version)]
#[command(about = "Agent execution core: tools, sandbox and event bus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and run built-in tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ToolsAction {
    /// List all available tools
    List,
    /// Show details for a specific tool
    Info {
        /// Tool name
        name: String,
    },
    /// Execute a tool inside the sandbox and print the result and event
    Exec {
        /// Tool name
        name: String,
        /// Positional arguments; values that parse as JSON are passed as JSON
        args: Vec<String>,
        /// Keyword argument, repeatable
        #[arg(long = "kw", value_name = "KEY=VALUE")]
        kwargs: Vec<String>,
        /// Sandbox working directory for this call
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Extra environment variable for this call, repeatable
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// CPU time limit for this call, seconds
        #[arg(long)]
        cpu_time: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,
    /// Check configuration for errors and warnings
    Check,
}

pub async fn run() -> Result<()> {
    // Load config early so logging settings apply; fall back to defaults if
    // the config file is missing or unreadable.
    let logging_cfg = instantly::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = instantly::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Tools { action }) => {
            tools::cmd_tools(action).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("instantly {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Agent execution core: tools, sandbox and event bus");
}
