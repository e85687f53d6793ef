//! Where the client gets bearer tokens from.

use crate::error::{McpError, McpResult};
use async_trait::async_trait;
use dex_auth::TokenManager;
use tracing::warn;

/// Source of access tokens for MCP requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token that is currently valid, refreshing first if needed.
    async fn access_token(&self) -> McpResult<String>;

    /// Force a refresh after the server rejected the current token.
    async fn refresh(&self) -> McpResult<String>;

    /// Whether a token is stored at all. Never touches the network.
    async fn has_token(&self) -> bool;
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn access_token(&self) -> McpResult<String> {
        TokenManager::access_token(self).await.map_err(|e| {
            warn!(error = %e, "No usable access token");
            McpError::no_token(format!("No valid access token available: {e}"))
        })
    }

    async fn refresh(&self) -> McpResult<String> {
        let record = self
            .refresh_stored()
            .await
            .map_err(|e| McpError::no_token(e.to_string()))?;
        Ok(record.access_token)
    }

    async fn has_token(&self) -> bool {
        self.store()
            .load()
            .await
            .is_some_and(|record| !record.access_token.is_empty())
    }
}

/// A fixed token, for callers that manage credentials themselves.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> McpResult<String> {
        if self.0.is_empty() {
            return Err(McpError::no_token("No valid access token available"));
        }
        Ok(self.0.clone())
    }

    async fn refresh(&self) -> McpResult<String> {
        Err(McpError::no_token("static token cannot be refreshed"))
    }

    async fn has_token(&self) -> bool {
        !self.0.is_empty()
    }
}
