//! Meeting tool commands.
//!
//! Thin wrappers over [`GranolaClient`] that print normalized JSON.

use crate::commands::auth::SETUP_COMMAND;
use crate::config::DexConfig;
use clap::Subcommand;
use dex_mcp::meetings::{normalize_meeting_details, normalize_meeting_list, transcript_text, Meeting};
use dex_mcp::{GranolaClient, McpError, McpErrorCode};
use serde_json::{json, Value};
use std::process::ExitCode;
use tracing::{debug, error};

/// Meeting subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum MeetingsCommands {
    /// List recent meetings
    List,
    /// Fetch full meeting content
    Get {
        /// Meeting IDs
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Fetch a meeting transcript
    Transcript {
        /// Meeting ID
        id: String,
    },
    /// Ask a question about your meetings
    Query {
        /// Natural-language question
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

/// Handle meeting commands.
pub async fn handle_meetings(
    command: MeetingsCommands,
    config: &DexConfig,
) -> anyhow::Result<ExitCode> {
    let client = GranolaClient::new(config.mcp_config(), &config.auth_config())?;

    if !client.is_available().await {
        eprintln!("Not authenticated with Granola.");
        eprintln!("  Run: {SETUP_COMMAND}");
        return Ok(ExitCode::FAILURE);
    }

    // Ctrl-C aborts the in-flight request instead of killing the process mid-write
    let cancel = client.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling request");
            cancel.cancel();
        }
    });

    let result = run_command(&client, command).await;
    ctrl_c.abort();
    client.close().await;

    match result {
        Ok(output) => {
            print_value(&output)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(code = %e.code, error = %e.message, "Granola request failed");
            report_error(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_command(client: &GranolaClient, command: MeetingsCommands) -> Result<Value, McpError> {
    match command {
        MeetingsCommands::List => {
            let raw = client.list_meetings().await?;
            Ok(serde_json::to_value(normalize_meeting_list(&raw))?)
        }
        MeetingsCommands::Get { ids } => {
            let raw = client.get_meetings(&ids).await?;
            let meetings: Vec<Meeting> = normalize_meeting_details(&raw)
                .iter()
                .map(Meeting::from_value)
                .collect();
            Ok(serde_json::to_value(meetings)?)
        }
        MeetingsCommands::Transcript { id } => {
            let transcript = client
                .get_transcript(&id)
                .await
                .as_ref()
                .and_then(transcript_text);
            Ok(json!({ "meeting_id": id, "transcript": transcript }))
        }
        MeetingsCommands::Query { text } => client.query_meetings(&text.join(" ")).await,
    }
}

/// Strings print as-is, everything else as pretty JSON.
fn print_value(value: &Value) -> anyhow::Result<()> {
    match value {
        Value::String(text) => println!("{text}"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

fn report_error(e: &McpError) {
    eprintln!("Granola request failed: {e}");
    match e.code {
        McpErrorCode::NoToken | McpErrorCode::TokenExpired => {
            eprintln!("  Re-authenticate with: {SETUP_COMMAND}");
        }
        McpErrorCode::RateLimited | McpErrorCode::ServerError | McpErrorCode::Timeout => {
            eprintln!("  Granola is busy or unreachable; try again in a minute.");
        }
        _ => {}
    }
}
