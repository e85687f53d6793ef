//! MCP error types.

use std::fmt;
use thiserror::Error;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// What went wrong, as a closed set callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpErrorCode {
    /// No access token could be obtained.
    NoToken,
    /// The server answered 401.
    TokenExpired,
    /// The server answered 429.
    RateLimited,
    /// The server answered 5xx.
    ServerError,
    /// Any other non-200 status.
    HttpError,
    /// The JSON-RPC response carried an `error` member.
    RpcError,
    /// The response body was not valid JSON.
    ParseError,
    /// The response body could not be read.
    StreamError,
    /// The request could not be sent.
    RequestError,
    /// The request timed out.
    Timeout,
    /// The caller aborted the operation.
    Cancelled,
}

impl McpErrorCode {
    /// Stable upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoToken => "NO_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::HttpError => "HTTP_ERROR",
            Self::RpcError => "RPC_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::StreamError => "STREAM_ERROR",
            Self::RequestError => "REQUEST_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether a request failing with this code may be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::ServerError
                | Self::Timeout
                | Self::RequestError
                | Self::StreamError
        )
    }

    /// Map a non-200 HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::TokenExpired,
            429 => Self::RateLimited,
            s if s >= 500 => Self::ServerError,
            _ => Self::HttpError,
        }
    }
}

impl fmt::Display for McpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed MCP operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct McpError {
    pub code: McpErrorCode,
    pub message: String,
}

impl McpError {
    /// Create an error with the given code.
    pub fn new(code: McpErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a no-token error.
    pub fn no_token(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::NoToken, message)
    }

    /// Create a JSON-RPC error.
    pub fn rpc_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::RpcError, message)
    }

    /// Create a parse error.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    /// The operation was aborted.
    pub fn cancelled() -> Self {
        Self::new(McpErrorCode::Cancelled, "Operation cancelled")
    }

    /// Whether this error may be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse_error(e.to_string())
    }
}
