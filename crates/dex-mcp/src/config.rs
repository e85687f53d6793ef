//! Client configuration.

use crate::protocol::{ClientInfo, PROTOCOL_VERSION};
use crate::retry::RetryPolicy;
use std::time::Duration;

/// Granola's MCP endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://mcp.granola.ai/mcp";

/// Settings for [`GranolaClient`](crate::GranolaClient).
#[derive(Debug, Clone)]
pub struct McpConfig {
    /// Streamable-HTTP endpoint URL.
    pub endpoint: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Backoff for retryable failures.
    pub retry: RetryPolicy,
    /// How long cached tool results stay fresh.
    pub cache_ttl: Duration,
    /// Protocol version sent in `initialize`.
    pub protocol_version: String,
    /// Client identity sent in `initialize`.
    pub client_info: ClientInfo,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(5 * 60),
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo::default(),
        }
    }
}

impl McpConfig {
    /// Default settings against another endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}
