//! Error types for authentication operations.

use thiserror::Error;

/// Why a token refresh could not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshFailure {
    /// There is no token file at all.
    #[error("no stored tokens found")]
    NoTokens,

    /// The record carries no refresh token.
    #[error("no refresh_token stored")]
    NoRefreshToken,

    /// The record does not remember the token endpoint.
    #[error("no token_endpoint stored")]
    NoTokenEndpoint,

    /// The authorization server refused the refresh grant.
    #[error("refresh rejected: {0}")]
    Rejected(String),
}

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Failed to read or write the token file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize token data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to build or send an HTTP request.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Could not determine the home directory.
    #[error("Could not determine home directory")]
    NoConfigDir,

    /// Failed to set file permissions.
    #[error("Failed to set file permissions: {0}")]
    Permissions(String),

    /// Both discovery documents failed.
    #[error("Could not discover OAuth metadata.\n  RFC 8414: {rfc8414}\n  OpenID:   {openid}")]
    Discovery { rfc8414: String, openid: String },

    /// The discovered metadata is unusable.
    #[error("Invalid OAuth metadata: {0}")]
    InvalidMetadata(String),

    /// Dynamic Client Registration failed.
    #[error("Client registration failed: {0}")]
    Registration(String),

    /// No stored client and no registration endpoint to create one.
    #[error(
        "No registration_endpoint in OAuth metadata and no existing client_id. \
         Cannot proceed without client credentials."
    )]
    NoClientCredentials,

    /// The user (or the provider) denied the authorization request.
    #[error("Authorization denied: {error} ({})", .description.as_deref().unwrap_or("no details"))]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    /// The callback `state` did not match the one we generated.
    #[error("OAuth state mismatch (possible CSRF). Please try again.")]
    StateMismatch,

    /// The callback carried neither an error nor a code.
    #[error("No authorization code received in callback")]
    MissingAuthorizationCode,

    /// Nobody completed the browser step in time.
    #[error("Authorization timed out after {0} seconds. Please try again.")]
    AuthorizationTimeout(u64),

    /// The local callback listener failed.
    #[error("Callback server error: {0}")]
    CallbackServer(String),

    /// Exchanging the authorization code failed.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Refreshing the access token failed.
    #[error("Token refresh failed: {0}. Re-authenticate with: dex granola auth setup")]
    Refresh(#[from] RefreshFailure),

    /// No usable token and no way to get one without the user.
    #[error("Not authenticated: {0}. Run: dex granola auth setup")]
    NotAuthenticated(String),
}

impl AuthError {
    /// Whether the only remedy is running the interactive flow again.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::Refresh(_) | Self::NotAuthenticated(_) | Self::NoClientCredentials
        )
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_carries_both_messages() {
        let err = AuthError::Discovery {
            rfc8414: "HTTP 404".to_string(),
            openid: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("HTTP 404"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_denied_without_description() {
        let err = AuthError::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "Authorization denied: access_denied (no details)");
    }

    #[test]
    fn test_requires_reauth() {
        assert!(AuthError::Refresh(RefreshFailure::NoRefreshToken).requires_reauth());
        assert!(AuthError::NotAuthenticated("expired".to_string()).requires_reauth());
        assert!(!AuthError::StateMismatch.requires_reauth());
        assert!(!AuthError::AuthorizationTimeout(120).requires_reauth());
    }

    #[test]
    fn test_refresh_message_mentions_setup() {
        let err: AuthError = RefreshFailure::Rejected("HTTP 400".to_string()).into();
        assert!(err.to_string().contains("dex granola auth setup"));
    }
}
