//! Model Context Protocol (MCP) client for Granola.
//!
//! Talks to Granola's hosted MCP server over the Streamable-HTTP transport:
//! every JSON-RPC message is an HTTPS POST, answered with JSON or an SSE
//! stream. Bearer tokens come from [`dex_auth`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌──────────────┐
//! │  dex (CLI)  │────▶│ GranolaClient │────▶│  Granola MCP │
//! │             │◀────│ retry + cache │◀────│   (tools)    │
//! └─────────────┘     └───────┬───────┘     └──────────────┘
//!                             │
//!                     ┌───────▼───────┐
//!                     │ TokenProvider │  (dex_auth::TokenManager)
//!                     └───────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dex_auth::AuthConfig;
//! use dex_mcp::{meetings, GranolaClient, McpConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GranolaClient::new(McpConfig::default(), &AuthConfig::default())?;
//!
//! let list = client.list_meetings().await?;
//! for meeting in meetings::normalize_meeting_list(&list) {
//!     println!("{} {}", meeting.id, meeting.title);
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod config;
mod error;
pub mod meetings;
pub mod protocol;
mod retry;
mod sse;
mod token;
mod transport;

pub use cache::ResponseCache;
pub use client::{
    GranolaClient, TOOL_GET_MEETINGS, TOOL_GET_TRANSCRIPT, TOOL_LIST_MEETINGS,
    TOOL_QUERY_MEETINGS,
};
pub use config::{McpConfig, DEFAULT_ENDPOINT};
pub use error::{McpError, McpErrorCode, McpResult};
pub use protocol::extract_tool_content;
pub use retry::RetryPolicy;
pub use sse::parse_sse_body;
pub use token::{StaticToken, TokenProvider};
pub use transport::{HttpTransport, RpcReply, Transport, SESSION_HEADER};
