//! One-shot loopback listener for the OAuth redirect.
//!
//! The listener accepts connections until the first request for the callback
//! path arrives, answers it with a static page and stops. Other paths (the
//! browser's favicon probe, for instance) get a 404 and are otherwise ignored.

use crate::error::{AuthError, AuthResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long an accepted connection may take to send its request.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Page shown after the redirect was received.
const HTML_SUCCESS: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Dex - Granola Connected</title>
  <style>
    body { font-family: system-ui, -apple-system, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #fafafa; color: #222; }
    .container { text-align: center; padding: 2rem; }
    h1 { color: #16a34a; margin-bottom: 1rem; }
    p { color: #555; }
  </style>
</head>
<body>
  <div class="container">
    <h1>Granola Connected</h1>
    <p>You can close this tab and return to your terminal.</p>
  </div>
</body>
</html>"#;

/// Page shown when the redirect carried an error.
fn html_error(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Dex - Authorization Failed</title>
  <style>
    body {{ font-family: system-ui, -apple-system, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #fafafa; color: #222; }}
    .container {{ text-align: center; padding: 2rem; }}
    h1 {{ color: #dc2626; margin-bottom: 1rem; }}
    .error {{ font-family: monospace; margin-top: 1rem; padding: 1rem; background: #fee2e2; border-radius: 0.5rem; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>Authorization Failed</h1>
    <p>Return to your terminal for details.</p>
    <div class="error">{}</div>
  </div>
</body>
</html>"#,
        html_escape(error)
    )
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Query parameters of a callback request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extract the parameters from a parsed request URL.
    pub fn from_url(url: &url::Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }

    /// Settle the callback against the state we sent.
    ///
    /// An `error` wins over everything, then the state must match, then a
    /// code must be present.
    pub fn verify(self, expected_state: &str) -> AuthResult<String> {
        if let Some(error) = self.error {
            return Err(AuthError::AuthorizationDenied {
                error,
                description: self.error_description,
            });
        }
        if self.state.as_deref() != Some(expected_state) {
            return Err(AuthError::StateMismatch);
        }
        match self.code {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(AuthError::MissingAuthorizationCode),
        }
    }
}

/// A bound, not yet settled callback listener.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Bind `127.0.0.1:port`. Port `0` picks a free port.
    pub async fn bind(port: u16, path: impl Into<String>) -> AuthResult<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AuthError::CallbackServer(format!("failed to bind {addr}: {e}"))
        })?;
        Ok(Self {
            listener,
            path: path.into(),
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> AuthResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| AuthError::CallbackServer(e.to_string()))
    }

    /// Wait for the callback and settle it.
    ///
    /// Consumes the listener, so the socket is closed on every exit path,
    /// including the timeout.
    pub async fn wait(self, expected_state: &str, timeout: Duration) -> AuthResult<String> {
        info!(path = %self.path, timeout_secs = timeout.as_secs(), "Waiting for OAuth callback");
        match tokio::time::timeout(timeout, self.accept_callback()).await {
            Ok(Ok(params)) => params.verify(expected_state),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AuthError::AuthorizationTimeout(timeout.as_secs())),
        }
    }

    async fn accept_callback(self) -> AuthResult<CallbackParams> {
        // Capacity 1: the first callback settles, later ones are dropped
        let (tx, mut rx) = mpsc::channel::<CallbackParams>(1);

        loop {
            tokio::select! {
                biased;
                Some(params) = rx.recv() => return Ok(params),
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "Error accepting connection");
                            continue;
                        }
                    };
                    debug!(%peer, "Callback connection");

                    // Browsers hold preconnect sockets open without sending
                    // anything; those must not block the callback.
                    let tx = tx.clone();
                    let path = self.path.clone();
                    tokio::spawn(async move {
                        let served =
                            tokio::time::timeout(REQUEST_READ_TIMEOUT, handle_connection(stream, &path));
                        match served.await {
                            Ok(Ok(Some(params))) => {
                                if tx.try_send(params).is_err() {
                                    debug!(%peer, "Callback already settled, ignoring");
                                }
                            }
                            Ok(Ok(None)) => {}
                            Ok(Err(e)) => warn!(error = %e, "Error handling callback connection"),
                            Err(_) => debug!(%peer, "Connection sent no request"),
                        }
                    });
                }
            }
        }
    }
}

/// Serve one connection. Returns the parameters when it was the callback.
async fn handle_connection(
    mut stream: TcpStream,
    callback_path: &str,
) -> std::io::Result<Option<CallbackParams>> {
    let mut buffer = [0u8; 8192];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);

    // Request line: METHOD TARGET VERSION
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1));
    let Some(target) = target else {
        write_response(&mut stream, 400, "text/plain", "Bad Request").await;
        return Ok(None);
    };

    let parsed = match url::Url::parse(&format!("http://127.0.0.1{target}")) {
        Ok(url) => url,
        Err(_) => {
            write_response(&mut stream, 400, "text/plain", "Invalid URL").await;
            return Ok(None);
        }
    };

    if parsed.path() != callback_path {
        write_response(&mut stream, 404, "text/plain", "Not Found").await;
        return Ok(None);
    }

    let params = CallbackParams::from_url(&parsed);
    debug!(
        has_code = params.code.is_some(),
        has_state = params.state.is_some(),
        error = ?params.error,
        "Received OAuth callback"
    );

    match &params.error {
        Some(error) => {
            let message = params.error_description.as_deref().unwrap_or(error);
            write_response(&mut stream, 200, "text/html", &html_error(message)).await;
        }
        None => write_response(&mut stream, 200, "text/html", HTML_SUCCESS).await,
    }

    Ok(Some(params))
}

async fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let response = http_response(status, content_type, body);
    stream.write_all(response.as_bytes()).await.ok();
    stream.shutdown().await.ok();
}

/// Build an HTTP response.
fn http_response(status: u16, content_type: &str, body: &str) -> String {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Unknown",
    };

    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        content_type,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(code: Option<&str>, state: Option<&str>, error: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(String::from),
            state: state.map(String::from),
            error: error.map(String::from),
            error_description: None,
        }
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<script>"), "&lt;script&gt;");
        assert_eq!(html_escape("a & b"), "a &amp; b");
        assert_eq!(html_escape("it's"), "it&#39;s");
    }

    #[test]
    fn test_html_error_escapes() {
        let html = html_error("<script>alert('xss')</script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn test_from_url() {
        let url = url::Url::parse(
            "http://127.0.0.1/callback?code=abc%20def&state=xyz&unrelated=1",
        )
        .unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code.as_deref(), Some("abc def"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[test]
    fn test_verify_success() {
        let code = params(Some("the-code"), Some("s1"), None).verify("s1").unwrap();
        assert_eq!(code, "the-code");
    }

    #[test]
    fn test_verify_error_wins() {
        let err = params(Some("c"), Some("s1"), Some("access_denied"))
            .verify("s1")
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationDenied { .. }));
    }

    #[test]
    fn test_verify_state_mismatch() {
        let err = params(Some("c"), Some("other"), None).verify("s1").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));

        let err = params(Some("c"), None, None).verify("s1").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn test_verify_missing_code() {
        let err = params(None, Some("s1"), None).verify("s1").unwrap_err();
        assert!(matches!(err, AuthError::MissingAuthorizationCode));
    }

    async fn get(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_listener_ignores_other_paths_then_settles() {
        let listener = CallbackListener::bind(0, "/callback").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let waiter =
            tokio::spawn(async move { listener.wait("s1", Duration::from_secs(5)).await });

        let favicon = get(addr, "/favicon.ico").await;
        assert!(favicon.starts_with("HTTP/1.1 404"));

        let page = get(addr, "/callback?code=abc&state=s1").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains("Granola Connected"));

        assert_eq!(waiter.await.unwrap().unwrap(), "abc");

        // Settled: the socket is gone
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_listener_settles_while_another_connection_is_idle() {
        let listener = CallbackListener::bind(0, "/callback").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiter =
            tokio::spawn(async move { listener.wait("s1", Duration::from_secs(3)).await });

        // Opened first and never written to, like a browser preconnect
        let _idle = TcpStream::connect(addr).await.unwrap();

        let page = get(addr, "/callback?code=abc&state=s1").await;
        assert!(page.starts_with("HTTP/1.1 200"));

        assert_eq!(waiter.await.unwrap().unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_listener_reports_denial() {
        let listener = CallbackListener::bind(0, "/callback").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiter =
            tokio::spawn(async move { listener.wait("s1", Duration::from_secs(5)).await });

        let page = get(
            addr,
            "/callback?error=access_denied&error_description=User%20said%20no&state=s1",
        )
        .await;
        assert!(page.contains("User said no"));

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authorization denied: access_denied (User said no)"
        );
    }

    #[tokio::test]
    async fn test_listener_times_out_and_closes() {
        let listener = CallbackListener::bind(0, "/callback").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let err = listener
            .wait("s1", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationTimeout(_)));
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[test]
    fn test_http_response() {
        let response = http_response(404, "text/plain", "Not Found");
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.contains("Content-Length: 9\r\n"));
        assert!(response.ends_with("\r\n\r\nNot Found"));
    }
}
