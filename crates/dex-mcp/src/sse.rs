//! Server-Sent Events response bodies.
//!
//! Streamable-HTTP servers may answer a POST with `text/event-stream`. The
//! body is read to the end and the last JSON payload wins.

use crate::error::{McpError, McpResult};
use serde_json::Value;

/// Parse a complete SSE body into the JSON-RPC result it carries.
///
/// Every `data:` line is tried as JSON; lines that don't parse and `[DONE]`
/// markers are skipped. The last parsed object is authoritative: its
/// `result` is returned, its `error` becomes an `RPC_ERROR`, and an object
/// with neither is returned whole. No parsable line yields `Value::Null`.
pub fn parse_sse_body(body: &str) -> McpResult<Value> {
    let last = body
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty() && *data != "[DONE]")
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
        .last();

    match last {
        Some(message) => unwrap_rpc_message(message),
        None => Ok(Value::Null),
    }
}

/// Turn one JSON-RPC message into its result, or its error.
pub(crate) fn unwrap_rpc_message(mut message: Value) -> McpResult<Value> {
    if let Some(result) = message.get_mut("result") {
        if !result.is_null() {
            return Ok(result.take());
        }
    }
    if let Some(error) = message.get("error").filter(|e| !e.is_null()) {
        return Err(McpError::rpc_error(rpc_error_message(error)));
    }
    Ok(message)
}

fn rpc_error_message(error: &Value) -> String {
    let detail = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    format!("JSON-RPC error: {detail}")
}
