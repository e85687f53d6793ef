//! Client behavior against a mock Streamable-HTTP MCP server.

use dex_auth::{AuthConfig, ManualClock, TokenManager, TokenRecord, TokenStore};
use dex_mcp::{
    meetings, GranolaClient, HttpTransport, McpConfig, McpErrorCode, RetryPolicy, StaticToken,
    SESSION_HEADER,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOW: i64 = 1_700_000_000;

fn mcp_config(server: &MockServer) -> McpConfig {
    McpConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            factor: 2,
        },
        ..McpConfig::with_endpoint(format!("{}/mcp", server.uri()))
    }
}

fn client_with_static_token(server: &MockServer) -> GranolaClient {
    let config = mcp_config(server);
    let transport = HttpTransport::new(config.endpoint.clone(), config.request_timeout).unwrap();
    GranolaClient::with_parts(
        config,
        Arc::new(transport),
        Arc::new(StaticToken("test-token".to_string())),
        Arc::new(ManualClock::at_unix(NOW)),
    )
}

fn rpc_result(id: u64, result: serde_json::Value) -> serde_json::Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

async fn mount_initialize(server: &MockServer, session: &str) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_string_contains("\"method\":\"initialize\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(SESSION_HEADER, session)
                .set_body_json(rpc_result(1, json!({"protocolVersion": "2025-03-26"}))),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_string_contains("notifications/initialized"))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_session_header_is_echoed_and_last_sse_event_wins() {
    let server = MockServer::start().await;
    mount_initialize(&server, "sess-42").await;

    let sse = concat!(
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"partial\"}]}}\n",
        "\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"final answer\"}]}}\n",
        "\n",
        "data: [DONE]\n",
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header(SESSION_HEADER, "sess-42"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_string_contains("\"method\":\"tools/call\""))
        .and(body_string_contains("query_granola_meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_static_token(&server);
    let answer = client.query_meetings("what did we decide?").await.unwrap();

    assert_eq!(answer, json!("final answer"));
    assert_eq!(client.session_id().await.as_deref(), Some("sess-42"));
}

#[tokio::test]
async fn test_list_meetings_parses_text_content() {
    let server = MockServer::start().await;
    mount_initialize(&server, "sess-1").await;

    let listing = json!({"meetings": [
        {"id": "m1", "title": "Standup", "date": "2024-05-01T09:00:00Z"},
        {"id": "m2", "title": "Planning", "attendees": [{"name": "Ana"}]}
    ]});
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_string_contains("list_meetings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(
            2,
            json!({"content": [{"type": "text", "text": listing.to_string()}]}),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_static_token(&server);
    let first = client.list_meetings().await.unwrap();
    let second = client.list_meetings().await.unwrap();
    assert_eq!(first, second);

    let summaries = meetings::normalize_meeting_list(&first);
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].attendees, vec!["Ana"]);
}

#[tokio::test]
async fn test_json_rpc_error_maps_to_rpc_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_static_token(&server);
    let err = client.initialize().await.unwrap_err();

    assert_eq!(err.code, McpErrorCode::RpcError);
    assert_eq!(err.message, "JSON-RPC error: Method not found");
    assert!(!client.is_initialized());
}

#[tokio::test]
async fn test_rate_limit_is_retried_until_attempts_run_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "60"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_with_static_token(&server);
    let err = client.initialize().await.unwrap_err();

    assert_eq!(err.code, McpErrorCode::RateLimited);
    assert_eq!(err.message, "Rate limited (429)");
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such endpoint"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with_static_token(&server);
    let err = client.initialize().await.unwrap_err();

    assert_eq!(err.code, McpErrorCode::HttpError);
    assert_eq!(err.message, "HTTP 404: no such endpoint");
}

#[tokio::test]
async fn test_unparseable_json_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>", "application/json"))
        .mount(&server)
        .await;

    let client = client_with_static_token(&server);
    let err = client.initialize().await.unwrap_err();

    assert_eq!(err.code, McpErrorCode::ParseError);
    assert!(err.message.starts_with("Failed to parse response"), "{}", err.message);
}

#[tokio::test]
async fn test_empty_meeting_ids_make_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_with_static_token(&server);
    assert_eq!(client.get_meetings(&[]).await.unwrap(), json!([]));
}

#[tokio::test]
async fn test_unauthorized_triggers_one_refresh_then_propagates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("granola-tokens.json");

    let record: TokenRecord = serde_json::from_value(json!({
        "access_token": "old-access",
        "refresh_token": "old-refresh",
        "expires_at": NOW + 3600,
        "client_id": "client-1",
        "client_secret": "secret-1",
        "token_endpoint": format!("{}/token", server.uri()),
        "authorization_endpoint": format!("{}/authorize", server.uri()),
        "created_at": "2023-11-14T22:13:20.000Z"
    }))
    .unwrap();
    TokenStore::with_path(&token_path).save(&record).await.unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("Authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("Authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let auth = AuthConfig {
        token_path: Some(token_path.clone()),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::at_unix(NOW));
    let tokens = TokenManager::new(&auth).unwrap().with_clock(clock.clone());
    let config = mcp_config(&server);
    let transport = HttpTransport::new(config.endpoint.clone(), config.request_timeout).unwrap();
    let client = GranolaClient::with_parts(config, Arc::new(transport), Arc::new(tokens), clock);

    let err = client.initialize().await.unwrap_err();
    assert_eq!(err.code, McpErrorCode::TokenExpired);

    let stored = TokenStore::with_path(&token_path).load().await.unwrap();
    assert_eq!(stored.access_token, "new-access");
    assert_eq!(stored.refresh_token.as_deref(), Some("old-refresh"));
}

#[tokio::test]
async fn test_missing_token_file_is_no_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let auth = AuthConfig {
        token_path: Some(dir.path().join("missing.json")),
        ..Default::default()
    };
    let client = GranolaClient::new(mcp_config(&server), &auth).unwrap();

    assert!(!client.is_available().await);
    let err = client.list_meetings().await.unwrap_err();
    assert_eq!(err.code, McpErrorCode::NoToken);
}
