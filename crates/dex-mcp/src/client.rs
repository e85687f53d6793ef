//! Granola MCP client.
//!
//! Owns one MCP session: lazy `initialize`, monotonically increasing request
//! ids, the server-assigned session id, retries and a small result cache.

use crate::cache::ResponseCache;
use crate::config::McpConfig;
use crate::error::{McpError, McpErrorCode, McpResult};
use crate::protocol::{
    extract_tool_content, CallToolParams, InitializeParams, JsonRpcNotification, JsonRpcRequest,
};
use crate::token::TokenProvider;
use crate::transport::{HttpTransport, Transport};
use dex_auth::{AuthConfig, Clock, SystemClock, TokenManager};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tool returning meeting metadata (ids, titles, dates, attendees).
pub const TOOL_LIST_MEETINGS: &str = "list_meetings";
/// Tool returning full meeting content for a set of ids.
pub const TOOL_GET_MEETINGS: &str = "get_meetings";
/// Tool returning the raw transcript of one meeting.
pub const TOOL_GET_TRANSCRIPT: &str = "get_meeting_transcript";
/// Tool answering a natural-language question over meetings.
pub const TOOL_QUERY_MEETINGS: &str = "query_granola_meetings";

/// Cache key used for the meeting list.
const LIST_MEETINGS_CACHE_KEY: &str = "list_meetings";

/// Client for Granola's MCP server.
pub struct GranolaClient {
    config: McpConfig,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    cache: ResponseCache,
    /// Assigned by the server, echoed on every later request.
    session_id: RwLock<Option<String>>,
    initialized: AtomicBool,
    /// Request ID counter.
    next_id: AtomicU64,
    /// Serializes concurrent `initialize` calls.
    init_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl GranolaClient {
    /// Create a client that reads tokens from the store described by `auth`.
    pub fn new(config: McpConfig, auth: &AuthConfig) -> McpResult<Self> {
        let transport = HttpTransport::new(config.endpoint.clone(), config.request_timeout)?;
        let tokens = TokenManager::new(auth).map_err(|e| McpError::no_token(e.to_string()))?;
        Ok(Self::with_parts(
            config,
            Arc::new(transport),
            Arc::new(tokens),
            Arc::new(SystemClock),
        ))
    }

    /// Create a client from explicit collaborators.
    pub fn with_parts(
        config: McpConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: ResponseCache::new(config.cache_ttl, clock),
            config,
            transport,
            tokens,
            session_id: RwLock::new(None),
            initialized: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            init_lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight and future calls when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The token that aborts this client's calls.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether a token is stored. Never touches the network.
    pub async fn is_available(&self) -> bool {
        self.tokens.has_token().await
    }

    /// Whether `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// The current session id, if the server assigned one.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Get the next request ID.
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Open the MCP session. Does nothing once the session is open.
    ///
    /// The `notifications/initialized` notification that follows is best
    /// effort: its failure does not make the session unusable.
    pub async fn initialize(&self) -> McpResult<Value> {
        if self.is_initialized() {
            return Ok(Value::Null);
        }
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Ok(Value::Null);
        }

        info!(endpoint = %self.config.endpoint, "Initializing MCP session");
        let params = InitializeParams::new(
            self.config.protocol_version.clone(),
            self.config.client_info.clone(),
        );
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "initialize",
            serde_json::to_value(&params)?,
        );
        let result = self.send_with_retry(&request, None).await?;
        self.initialized.store(true, Ordering::SeqCst);

        let session = self.session_id().await;
        info!(session = session.as_deref().unwrap_or("none"), "MCP session initialized");

        let notification = JsonRpcNotification::new("notifications/initialized", json!({}));
        match self.tokens.access_token().await {
            Ok(token) => {
                if let Err(e) = self
                    .transport
                    .notify(&notification, &token, session.as_deref())
                    .await
                {
                    debug!(error = %e, "Initialized notification failed");
                }
            }
            Err(e) => debug!(error = %e, "Skipping initialized notification"),
        }

        Ok(result)
    }

    /// Call a tool, aborting if the client's cancellation token fires.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cache_key: Option<&str>,
    ) -> McpResult<Value> {
        self.call_tool_cancellable(name, arguments, cache_key, &self.cancel)
            .await
    }

    /// Call a tool, aborting if `cancel` fires.
    ///
    /// Cancelling drops the in-flight request, which closes its connection.
    pub async fn call_tool_cancellable(
        &self,
        name: &str,
        arguments: Value,
        cache_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> McpResult<Value> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(tool = %name, "Tool call cancelled");
                Err(McpError::cancelled())
            }
            result = self.call_tool_inner(name, arguments, cache_key) => result,
        }
    }

    async fn call_tool_inner(
        &self,
        name: &str,
        arguments: Value,
        cache_key: Option<&str>,
    ) -> McpResult<Value> {
        if !self.is_initialized() {
            self.initialize().await?;
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let request = JsonRpcRequest::new(
            self.next_request_id(),
            "tools/call",
            serde_json::to_value(&params)?,
        );
        self.send_with_retry(&request, cache_key).await
    }

    /// Send one request with caching, token refresh and backoff.
    ///
    /// A 401 on the first attempt triggers one refresh and an immediate
    /// retry that does not count against the attempt budget. A second 401
    /// is returned as is.
    pub async fn send_with_retry(
        &self,
        request: &JsonRpcRequest,
        cache_key: Option<&str>,
    ) -> McpResult<Value> {
        if let Some(key) = cache_key {
            if let Some(hit) = self.cache.get(key) {
                debug!(key, "Cache hit");
                return Ok(hit);
            }
        }

        let mut token = self.tokens.access_token().await?;
        let policy = self.config.retry;
        let mut attempt = 1;
        let mut refreshed = false;

        loop {
            let session = self.session_id().await;
            let error = match self.transport.send(request, &token, session.as_deref()).await {
                Ok(reply) => {
                    if let Some(id) = reply.session_id {
                        *self.session_id.write().await = Some(id);
                    }
                    if let Some(key) = cache_key {
                        if !reply.result.is_null() {
                            self.cache.insert(key, reply.result.clone());
                        }
                    }
                    return Ok(reply.result);
                }
                Err(e) => e,
            };

            if error.code == McpErrorCode::TokenExpired && attempt == 1 && !refreshed {
                refreshed = true;
                info!("Access token rejected, refreshing");
                match self.tokens.refresh().await {
                    Ok(new_token) => {
                        token = new_token;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Token refresh failed");
                        return Err(error);
                    }
                }
            }

            if !error.is_retryable() || !policy.has_attempt_after(attempt) {
                return Err(error);
            }

            let delay = policy.delay_after(attempt);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                code = %error.code,
                delay_ms = delay.as_millis() as u64,
                "MCP request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Meeting metadata, cached for the configured TTL.
    pub async fn list_meetings(&self) -> McpResult<Value> {
        debug!("Calling list_meetings");
        let result = self
            .call_tool(TOOL_LIST_MEETINGS, json!({}), Some(LIST_MEETINGS_CACHE_KEY))
            .await?;
        Ok(extract_tool_content(result))
    }

    /// Full content for the given meetings. An empty list makes no call.
    pub async fn get_meetings(&self, meeting_ids: &[String]) -> McpResult<Value> {
        if meeting_ids.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        debug!(count = meeting_ids.len(), "Calling get_meetings");
        let result = self
            .call_tool(TOOL_GET_MEETINGS, json!({ "meeting_ids": meeting_ids }), None)
            .await?;
        Ok(extract_tool_content(result))
    }

    /// The transcript of one meeting, or `None` when it can't be fetched.
    ///
    /// Transcripts are not available on every plan, so failures are logged
    /// and swallowed.
    pub async fn get_transcript(&self, meeting_id: &str) -> Option<Value> {
        debug!(meeting_id, "Calling get_meeting_transcript");
        match self
            .call_tool(TOOL_GET_TRANSCRIPT, json!({ "meeting_id": meeting_id }), None)
            .await
        {
            Ok(result) => Some(extract_tool_content(result)).filter(|v| !v.is_null()),
            Err(e) => {
                info!(meeting_id, error = %e, "Transcript unavailable");
                None
            }
        }
    }

    /// Ask a natural-language question about meetings. Never cached.
    pub async fn query_meetings(&self, query: &str) -> McpResult<Value> {
        debug!(query, "Calling query_granola_meetings");
        let result = self
            .call_tool(TOOL_QUERY_MEETINGS, json!({ "query": query }), None)
            .await?;
        Ok(extract_tool_content(result))
    }

    /// Reset to the freshly constructed state.
    pub async fn close(&self) {
        *self.session_id.write().await = None;
        self.initialized.store(false, Ordering::SeqCst);
        self.next_id.store(1, Ordering::SeqCst);
        self.cache.clear();
        debug!("Closed MCP session");
    }
}

impl std::fmt::Debug for GranolaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GranolaClient")
            .field("endpoint", &self.config.endpoint)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
