//! Granola authentication command handlers.
//!
//! `setup` runs the browser flow, `status` inspects the token file, `refresh`
//! forces a refresh grant and `revoke` deletes the stored tokens. Exit codes
//! are relied on by scripts: `status` exits 0 when a token is usable now or
//! after a refresh and 1 otherwise.

use crate::config::DexConfig;
use clap::Subcommand;
use dex_auth::{
    format_duration, AuthError, AuthorizationFlow, Clock, FlowState, SystemClock, TokenManager,
    TokenRecord, TokenStatus,
};
use std::process::ExitCode;
use tracing::error;

/// Command that re-runs the browser flow.
pub const SETUP_COMMAND: &str = "dex granola auth setup";

/// Authentication subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthCommands {
    /// Run the full OAuth flow in the browser (default)
    #[default]
    Setup,
    /// Show token status (exit 1 when re-authorization is needed)
    Status,
    /// Force a token refresh
    Refresh,
    /// Delete stored tokens
    Revoke,
}

/// Handle authentication commands.
pub async fn handle_auth(command: AuthCommands, config: &DexConfig) -> anyhow::Result<ExitCode> {
    match command {
        AuthCommands::Setup => auth_setup(config).await,
        AuthCommands::Status => auth_status(config).await,
        AuthCommands::Refresh => auth_refresh(config).await,
        AuthCommands::Revoke => auth_revoke(config).await,
    }
}

fn print_header(title: &str) {
    println!();
    println!("{title}");
    println!("{}", "─".repeat(title.chars().count()));
    println!();
}

/// Run the interactive authorization flow.
async fn auth_setup(config: &DexConfig) -> anyhow::Result<ExitCode> {
    print_header("Granola MCP: OAuth Authentication");

    let flow = AuthorizationFlow::new(config.auth_config())?.on_progress(|state| match state {
        FlowState::Discovering => println!("  Discovering OAuth metadata..."),
        FlowState::Registering => println!("  Registering client with Granola..."),
        FlowState::AwaitingCallback => {
            println!("  Opening browser for authorization...");
            println!("  Waiting for authorization (up to 2 minutes)...");
        }
        FlowState::Exchanging => println!("  Exchanging authorization code for tokens..."),
        FlowState::Persisted => {}
    });

    match flow.run().await {
        Ok(record) => {
            let expires_in = record.seconds_until_expiry(SystemClock.unix_now()).max(0);
            println!();
            println!("  Tokens saved to {}", flow.store().path().display());
            println!("  Expires in: {}", format_duration(expires_in as u64));
            println!();
            println!("Done! Granola MCP authentication is ready.");
            println!();
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Authorization flow failed");
            eprintln!();
            eprintln!("Authentication failed: {e}");
            print_remediation(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print where a failed flow leaves the user.
fn print_remediation(e: &AuthError) {
    let hint = match e {
        AuthError::StateMismatch => "The callback did not match this sign-in attempt. Run again:",
        AuthError::AuthorizationTimeout(_) => "No response from the browser in time. Run again:",
        AuthError::AuthorizationDenied { .. } => "Access was not granted. To try again, run:",
        AuthError::CallbackServer(_) => {
            "The callback port is busy; close the other sign-in attempt and run:"
        }
        _ => "To retry, run:",
    };
    eprintln!("  {hint}");
    eprintln!("    {SETUP_COMMAND}");
    eprintln!();
}

/// Exit code for `status`: 0 while a token is usable now or after a refresh.
pub fn status_exit_code(status: &TokenStatus) -> u8 {
    if status.is_authenticated() {
        0
    } else {
        1
    }
}

/// First `n` characters followed by an ellipsis, for display.
fn preview(value: &str, n: usize) -> String {
    if value.is_empty() {
        return "none".to_string();
    }
    let head: String = value.chars().take(n).collect();
    format!("{head}...")
}

/// Status lines for a record, without the header.
pub fn status_lines(
    record: Option<&TokenRecord>,
    status: &TokenStatus,
    token_file: &str,
) -> Vec<String> {
    let Some(record) = record.filter(|_| *status != TokenStatus::NotAuthenticated) else {
        return vec![
            "  Status: Not authenticated".to_string(),
            format!("  Tokens file: {token_file} (not found)"),
            String::new(),
            format!("  Run: {SETUP_COMMAND}"),
        ];
    };

    let label = match status {
        TokenStatus::Active { .. } => "Active",
        TokenStatus::ExpiredRefreshable { .. } => "Expired (refresh available)",
        _ => "Expired",
    };
    let mut lines = vec![
        format!("  Status: {label}"),
        format!("  Tokens file: {token_file}"),
        format!("  Client ID: {}", preview(&record.client_id, 16)),
        format!("  Access token: {}", preview(&record.access_token, 12)),
        format!(
            "  Refresh token: {}",
            if record.can_refresh() { "present" } else { "none" }
        ),
    ];
    match status {
        TokenStatus::Active {
            expires_in: Some(expires_in),
        } => {
            lines.push(format!("  Expires in: {}", format_duration(*expires_in as u64)));
        }
        TokenStatus::Active { expires_in: None } => lines.push("  Expires: unknown".to_string()),
        TokenStatus::ExpiredRefreshable { expired_for } | TokenStatus::Expired { expired_for } => {
            lines.push(format!("  Expired: {} ago", format_duration(*expired_for as u64)));
        }
        TokenStatus::NotAuthenticated => {}
    }
    let or_unknown = |s: &str| {
        if s.is_empty() {
            "unknown".to_string()
        } else {
            s.to_string()
        }
    };
    lines.push(format!("  Created: {}", or_unknown(&record.created_at)));
    lines.push(format!("  Token endpoint: {}", or_unknown(&record.token_endpoint)));
    lines
}

/// Show token status.
async fn auth_status(config: &DexConfig) -> anyhow::Result<ExitCode> {
    let manager = TokenManager::new(&config.auth_config())?;
    let record = manager.store().load().await;
    let status = TokenStatus::of(record.as_ref(), SystemClock.unix_now());

    print_header("Granola MCP: Auth Status");
    let token_file = manager.store().path().display().to_string();
    for line in status_lines(record.as_ref(), &status, &token_file) {
        println!("{line}");
    }
    println!();

    Ok(ExitCode::from(status_exit_code(&status)))
}

/// Force a refresh of whatever is stored.
async fn auth_refresh(config: &DexConfig) -> anyhow::Result<ExitCode> {
    let manager = TokenManager::new(&config.auth_config())?;

    println!("  Refreshing access token...");
    match manager.refresh_stored().await {
        Ok(record) => {
            let expires_in = record.seconds_until_expiry(SystemClock.unix_now()).max(0);
            println!(
                "  Token refreshed. Expires in: {}",
                format_duration(expires_in as u64)
            );
            println!();
            println!("  New access token: {}", preview(&record.access_token, 12));
            println!();
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "Token refresh failed");
            eprintln!("Refresh failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Delete stored tokens.
async fn auth_revoke(config: &DexConfig) -> anyhow::Result<ExitCode> {
    let store = config.auth_config().token_store()?;

    print_header("Granola MCP: Revoking Tokens");
    if store.delete().await? {
        println!("  Tokens deleted: {}", store.path().display());
    } else {
        println!("  No tokens file found, nothing to revoke.");
    }
    println!();

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: i64, refresh: Option<&str>) -> TokenRecord {
        serde_json::from_value(serde_json::json!({
            "access_token": "access-token-value",
            "refresh_token": refresh,
            "expires_at": expires_at,
            "client_id": "client-identifier-1234",
            "client_secret": "secret",
            "token_endpoint": "https://auth.test/token",
            "authorization_endpoint": "https://auth.test/authorize",
            "created_at": "2023-11-14T22:13:20.000Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_status_exit_codes() {
        assert_eq!(status_exit_code(&TokenStatus::NotAuthenticated), 1);
        assert_eq!(status_exit_code(&TokenStatus::Active { expires_in: Some(10) }), 0);
        assert_eq!(
            status_exit_code(&TokenStatus::ExpiredRefreshable { expired_for: 10 }),
            0
        );
        assert_eq!(status_exit_code(&TokenStatus::Expired { expired_for: 10 }), 1);
    }

    #[test]
    fn test_status_lines_active() {
        let record = record(1_000 + 720, Some("refresh"));
        let status = TokenStatus::of(Some(&record), 1_000);
        let lines = status_lines(Some(&record), &status, "/tmp/t.json");

        assert_eq!(lines[0], "  Status: Active");
        assert!(lines.contains(&"  Client ID: client-identifie...".to_string()));
        assert!(lines.contains(&"  Access token: access-token...".to_string()));
        assert!(lines.contains(&"  Refresh token: present".to_string()));
        assert!(lines.contains(&"  Expires in: 12m".to_string()));
    }

    #[test]
    fn test_status_lines_expired() {
        let record = record(1_000, None);
        let status = TokenStatus::of(Some(&record), 1_045);
        let lines = status_lines(Some(&record), &status, "/tmp/t.json");

        assert_eq!(lines[0], "  Status: Expired");
        assert!(lines.contains(&"  Refresh token: none".to_string()));
        assert!(lines.contains(&"  Expired: 45s ago".to_string()));
    }

    #[test]
    fn test_status_lines_without_expiry() {
        let record = record(0, None);
        let status = TokenStatus::of(Some(&record), 1_000);
        let lines = status_lines(Some(&record), &status, "/tmp/t.json");

        assert_eq!(lines[0], "  Status: Active");
        assert!(lines.contains(&"  Expires: unknown".to_string()));
        assert_eq!(status_exit_code(&status), 0);
    }

    #[test]
    fn test_status_lines_missing() {
        let lines = status_lines(None, &TokenStatus::NotAuthenticated, "/tmp/t.json");
        assert_eq!(lines[0], "  Status: Not authenticated");
        assert_eq!(lines[1], "  Tokens file: /tmp/t.json (not found)");
        assert_eq!(lines[3], format!("  Run: {SETUP_COMMAND}"));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("", 4), "none");
        assert_eq!(preview("abcdefgh", 4), "abcd...");
    }
}
