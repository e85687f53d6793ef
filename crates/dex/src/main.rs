//! Dex - meeting intelligence from Granola.
//!
//! This is the main entry point for the dex CLI.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::*;
use config::DexConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "dex")]
#[command(author, version, about = "Meeting intelligence from Granola", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.config/dex/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to the log directory instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Granola integration
    Granola {
        #[command(subcommand)]
        command: GranolaCommands,
    },
}

#[derive(Subcommand)]
enum GranolaCommands {
    /// Authenticate with Granola (runs setup when no subcommand is given)
    Auth {
        #[command(subcommand)]
        command: Option<AuthCommands>,
    },
    /// Check whether Granola sign-in is needed (prints JSON; exit 0, 1 or 2)
    Check,
    /// Read meetings through Granola's MCP server
    Meetings {
        #[command(subcommand)]
        command: MeetingsCommands,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match DexConfig::load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_file = init_logging(cli.verbose, cli.log_file || config.log_file);
    if let Some(path) = &log_file {
        debug!(path = %path.display(), "Logging to file");
    }

    let result = match cli.command {
        Commands::Granola { command } => match command {
            GranolaCommands::Auth { command } => {
                handle_auth(command.unwrap_or_default(), &config).await
            }
            GranolaCommands::Check => handle_check(&config).await,
            GranolaCommands::Meetings { command } => handle_meetings(command, &config).await,
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
