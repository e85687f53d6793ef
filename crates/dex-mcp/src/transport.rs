//! Streamable-HTTP transport.
//!
//! Every JSON-RPC message is a POST to one endpoint. The server answers with
//! either a JSON document or an SSE stream and may assign a session id in the
//! `Mcp-Session-Id` header, which is echoed on later requests.

use crate::error::{McpError, McpErrorCode, McpResult};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest};
use crate::sse::{parse_sse_body, unwrap_rpc_message};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Session header name.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Longest slice of an error body kept in messages.
const ERROR_BODY_LIMIT: usize = 200;

/// A successful reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    /// The JSON-RPC result; `Null` when an SSE stream carried nothing usable.
    pub result: Value,
    /// Session id to use from now on.
    pub session_id: Option<String>,
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its result.
    async fn send(
        &self,
        request: &JsonRpcRequest,
        access_token: &str,
        session_id: Option<&str>,
    ) -> McpResult<RpcReply>;

    /// Send a notification (no result expected).
    async fn notify(
        &self,
        notification: &JsonRpcNotification,
        access_token: &str,
        session_id: Option<&str>,
    ) -> McpResult<()>;
}

/// [`Transport`] over HTTPS POST with JSON or SSE responses.
pub struct HttpTransport {
    endpoint: String,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> McpResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            McpError::new(
                McpErrorCode::RequestError,
                format!("Failed to create HTTP client: {e}"),
            )
        })?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// The endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build request with common headers.
    fn build_request<T: Serialize + ?Sized>(
        &self,
        body: &T,
        access_token: &str,
        session_id: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("Authorization", format!("Bearer {access_token}"))
            .json(body);

        if let Some(id) = session_id {
            req = req.header(SESSION_HEADER, id);
        }

        req
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        body: &T,
        access_token: &str,
        session_id: Option<&str>,
    ) -> McpResult<Response> {
        self.build_request(body, access_token, session_id)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    McpError::new(McpErrorCode::Timeout, "Request timed out")
                } else {
                    McpError::new(McpErrorCode::RequestError, format!("Request error: {e}"))
                }
            })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &JsonRpcRequest,
        access_token: &str,
        session_id: Option<&str>,
    ) -> McpResult<RpcReply> {
        debug!(id = request.id, method = %request.method, "Sending MCP request");

        let response = self.post(request, access_token, session_id).await?;

        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| session_id.map(str::to_string));
        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/event-stream"));
        let status = response.status();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                McpError::new(McpErrorCode::Timeout, "Request timed out")
            } else {
                McpError::new(
                    McpErrorCode::StreamError,
                    format!("Response stream error: {e}"),
                )
            }
        })?;

        if status != StatusCode::OK {
            return Err(status_error(status, &body));
        }

        let result = if is_sse {
            parse_sse_body(&body)?
        } else {
            let message: Value = serde_json::from_str(&body).map_err(|e| {
                McpError::parse_error(format!("Failed to parse response: {e}"))
            })?;
            unwrap_rpc_message(message)?
        };

        Ok(RpcReply { result, session_id })
    }

    async fn notify(
        &self,
        notification: &JsonRpcNotification,
        access_token: &str,
        session_id: Option<&str>,
    ) -> McpResult<()> {
        debug!(method = %notification.method, "Sending MCP notification");

        let response = self.post(notification, access_token, session_id).await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Notification returned non-success status");
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        Ok(())
    }
}

/// Map a non-200 status to its error.
fn status_error(status: StatusCode, body: &str) -> McpError {
    let code = McpErrorCode::from_status(status.as_u16());
    let message = match code {
        McpErrorCode::TokenExpired => format!("Authentication failed ({})", status.as_u16()),
        McpErrorCode::RateLimited => format!("Rate limited ({})", status.as_u16()),
        McpErrorCode::ServerError => format!("Server error ({})", status.as_u16()),
        _ => format!("HTTP {}: {}", status.as_u16(), truncate(body, ERROR_BODY_LIMIT)),
    };
    McpError::new(code, message)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
