//! Granola authentication for Dex.
//!
//! This crate owns everything needed to obtain and keep a bearer token for
//! Granola's MCP server:
//!
//! - **Token store**: a single JSON credential record on disk
//! - **PKCE**: verifier/state generation and the S256 challenge (RFC 7636)
//! - **Discovery**: authorization-server metadata (RFC 8414, OpenID fallback)
//!   and Dynamic Client Registration (RFC 7591)
//! - **Authorization flow**: browser + local callback listener + code exchange
//! - **Refresh**: transparent refresh-before-expiry with a fixed safety buffer
//!
//! # Storage Location
//!
//! Tokens are stored at `~/.config/dex/granola-tokens.json`. Other Dex
//! scripts read this file directly, so its field names are a stable contract.
//! The file is written with restrictive permissions (0600 on Unix).
//!
//! # Example
//!
//! ```no_run
//! use dex_auth::{AuthConfig, AuthorizationFlow, TokenManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::default();
//!
//!     // Interactive: opens the browser and waits for the callback
//!     let record = AuthorizationFlow::new(config.clone())?.run().await?;
//!     println!("expires at {}", record.expires_at);
//!
//!     // Later: always returns a token that is valid for at least a minute
//!     let manager = TokenManager::new(&config)?;
//!     let token = manager.access_token().await?;
//!     # let _ = token;
//!     Ok(())
//! }
//! ```

mod callback;
mod clock;
mod config;
mod discovery;
mod error;
mod flow;
mod http;
pub mod pkce;
mod refresh;
mod store;

pub use callback::{CallbackListener, CallbackParams};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use discovery::{
    discover_metadata, register_client, AuthorizationServerMetadata, ClientRegistration,
    OAUTH_METADATA_PATH, OPENID_CONFIG_PATH,
};
pub use error::{AuthError, AuthResult, RefreshFailure};
pub use flow::{build_authorization_url, AuthorizationFlow, BrowserLauncher, FlowState, SystemBrowser};
pub use refresh::{TokenManager, TokenStatus, DEFAULT_EXPIRES_IN_SECS, EXPIRY_BUFFER_SECS};
pub use store::{TokenRecord, TokenStore};

/// Get the default token file path.
///
/// Returns `None` if the home directory cannot be determined.
pub fn default_token_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("dex").join("granola-tokens.json"))
}

/// Format a number of seconds as a short human-readable duration.
///
/// `45` → `45s`, `720` → `12m`, `7200` → `2h`, `7500` → `2h 5m`.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 3600 {
        return format!("{}m", seconds / 60);
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if minutes > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{hours}h")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(60), "1m");
        assert_eq!(format_duration(720), "12m");
        assert_eq!(format_duration(3600), "1h");
        assert_eq!(format_duration(7200), "2h");
        assert_eq!(format_duration(7500), "2h 5m");
    }

    #[test]
    fn test_default_token_path() {
        if let Some(path) = default_token_path() {
            assert!(path.ends_with(".config/dex/granola-tokens.json"));
        }
    }
}
