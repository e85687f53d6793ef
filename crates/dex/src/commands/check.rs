//! Migration check: should this user be asked to sign in to Granola?
//!
//! Prints a single JSON object on stdout. Exit codes:
//!
//! - `0`: nothing to do (Granola not installed, or already authenticated)
//! - `1`: migration available (Granola in use, no tokens yet)
//! - `2`: tokens unusable (expired without refresh token, or corrupt file)

use crate::commands::auth::SETUP_COMMAND;
use crate::config::DexConfig;
use dex_auth::{AuthResult, Clock, SystemClock, TokenRecord};
use serde::Serialize;
use std::process::ExitCode;
use tracing::debug;

/// Outcome of the migration check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckReport {
    NotApplicable {
        reason: String,
    },
    MigrationAvailable {
        message: String,
        auth_command: String,
    },
    TokenExpired {
        message: String,
        auth_command: String,
    },
    TokenError {
        message: String,
        auth_command: String,
    },
    Authenticated {
        expires_at: i64,
    },
}

impl CheckReport {
    /// Decide from what is on disk.
    ///
    /// `tokens` is the result of reading the token file: `Ok(None)` when it
    /// is absent, `Err` when it exists but cannot be parsed.
    pub fn evaluate(
        granola_installed: bool,
        tokens: AuthResult<Option<TokenRecord>>,
        now: i64,
    ) -> Self {
        if !granola_installed {
            return Self::NotApplicable {
                reason: "Granola not installed".to_string(),
            };
        }

        match tokens {
            Ok(None) => Self::MigrationAvailable {
                message: "Granola now supports mobile recordings. Sign in once to enable."
                    .to_string(),
                auth_command: SETUP_COMMAND.to_string(),
            },
            Ok(Some(record)) if record.expires_at < now && !record.can_refresh() => {
                Self::TokenExpired {
                    message: "Granola authentication has expired. Sign in again to continue \
                              syncing mobile recordings."
                        .to_string(),
                    auth_command: SETUP_COMMAND.to_string(),
                }
            }
            Ok(Some(record)) => Self::Authenticated {
                expires_at: record.expires_at,
            },
            Err(e) => {
                debug!(error = %e, "Token file unreadable");
                Self::TokenError {
                    message: "Granola token file is corrupted. Sign in again.".to_string(),
                    auth_command: SETUP_COMMAND.to_string(),
                }
            }
        }
    }

    /// Process exit code scripts branch on.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NotApplicable { .. } | Self::Authenticated { .. } => 0,
            Self::MigrationAvailable { .. } => 1,
            Self::TokenExpired { .. } | Self::TokenError { .. } => 2,
        }
    }
}

/// Handle `dex granola check`.
pub async fn handle_check(config: &DexConfig) -> anyhow::Result<ExitCode> {
    let granola_installed = config
        .desktop_cache_path()
        .is_some_and(|path| path.exists());
    let store = config.auth_config().token_store()?;
    let tokens = store.read().await;

    let report = CheckReport::evaluate(granola_installed, tokens, SystemClock.unix_now());
    println!("{}", serde_json::to_string(&report)?);

    Ok(ExitCode::from(report.exit_code()))
}
