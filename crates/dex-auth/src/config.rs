//! Authentication configuration.

use crate::error::AuthResult;
use crate::store::TokenStore;
use std::path::PathBuf;
use std::time::Duration;

/// Granola's MCP origin; discovery documents live under it.
pub const DEFAULT_SERVER_ORIGIN: &str = "https://mcp.granola.ai";

/// Fixed loopback port for the OAuth callback.
pub const DEFAULT_CALLBACK_PORT: u16 = 8914;

/// Path of the callback route.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

/// Name registered with the authorization server.
pub const DEFAULT_CLIENT_NAME: &str = "Dex Meeting Intel";

/// Settings for discovery, the authorization flow and token refresh.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Origin that serves the well-known discovery documents.
    pub server_origin: String,
    /// Loopback port the callback listener binds to.
    pub callback_port: u16,
    /// Callback route.
    pub callback_path: String,
    /// Host used in the redirect URI (the listener always binds 127.0.0.1).
    pub redirect_host: String,
    /// Requested scope.
    pub scope: String,
    /// Client name sent with Dynamic Client Registration.
    pub client_name: String,
    /// Hard limit on the browser step.
    pub authorization_timeout: Duration,
    /// Timeout for discovery, registration and token endpoint calls.
    pub http_timeout: Duration,
    /// Where the token record lives. `None` means the default path.
    pub token_path: Option<PathBuf>,
    /// Keep the previous refresh token when a refresh response omits one.
    pub keep_refresh_token_on_omit: bool,
    /// Only reuse a stored client when its endpoints match the discovered ones.
    pub validate_client_endpoints: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            server_origin: DEFAULT_SERVER_ORIGIN.to_string(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            redirect_host: "localhost".to_string(),
            scope: "openid".to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            authorization_timeout: Duration::from_secs(120),
            http_timeout: Duration::from_secs(15),
            token_path: None,
            keep_refresh_token_on_omit: true,
            validate_client_endpoints: true,
        }
    }
}

impl AuthConfig {
    /// The redirect URI registered with, and sent to, the authorization server.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.redirect_host, self.callback_port, self.callback_path
        )
    }

    /// Build the HTTP client used for all OAuth endpoint calls.
    pub(crate) fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }

    /// Open the token store this configuration points at.
    pub fn token_store(&self) -> AuthResult<TokenStore> {
        match &self.token_path {
            Some(path) => Ok(TokenStore::with_path(path)),
            None => TokenStore::new(),
        }
    }
}
