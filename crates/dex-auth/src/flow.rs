//! The interactive authorization-code flow with PKCE.
//!
//! ```text
//! Discovering -> [Registering] -> AwaitingCallback -> Exchanging -> Persisted
//! ```
//!
//! Any failure ends the flow with an error and nothing written to disk.

use crate::callback::CallbackListener;
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::discovery::{discover_metadata, register_client};
use crate::error::{AuthError, AuthResult};
use crate::http::post_form;
use crate::pkce;
use crate::refresh::TokenResponse;
use crate::store::{TokenRecord, TokenStore};
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::Map;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Discovering,
    Registering,
    AwaitingCallback,
    Exchanging,
    Persisted,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovering => "discovering",
            Self::Registering => "registering",
            Self::AwaitingCallback => "awaiting_callback",
            Self::Exchanging => "exchanging",
            Self::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Opens the authorization URL for the user.
pub trait BrowserLauncher: Send + Sync {
    /// Try to open `url` in a browser.
    fn open(&self, url: &str) -> std::io::Result<()>;

    /// Called when [`open`](Self::open) failed; the flow keeps waiting.
    fn manual_fallback(&self, url: &str) {
        eprintln!("\nCould not open a browser. Open this URL manually:\n\n  {url}\n");
    }
}

/// Uses the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// Build the authorization request URL (RFC 6749 §4.1.1 plus PKCE).
pub fn build_authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
    code_challenge: &str,
) -> AuthResult<String> {
    let mut url = url::Url::parse(authorization_endpoint).map_err(|e| {
        AuthError::InvalidMetadata(format!(
            "authorization_endpoint {authorization_endpoint:?} is not a URL: {e}"
        ))
    })?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("state", state)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", "S256");
    Ok(url.into())
}

type ProgressFn = dyn Fn(FlowState) + Send + Sync;

/// Runs discovery, registration, the browser step and the code exchange.
pub struct AuthorizationFlow {
    config: AuthConfig,
    store: TokenStore,
    http: Client,
    clock: Arc<dyn Clock>,
    browser: Arc<dyn BrowserLauncher>,
    progress: Option<Box<ProgressFn>>,
}

impl AuthorizationFlow {
    /// Create a flow using the system clock and browser.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        Ok(Self {
            store: config.token_store()?,
            http: config.http_client()?,
            clock: Arc::new(SystemClock),
            browser: Arc::new(SystemBrowser),
            progress: None,
            config,
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the browser launcher.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// Observe state transitions (for console progress output).
    pub fn on_progress(mut self, f: impl Fn(FlowState) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// The store the result is written to.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn enter(&self, state: FlowState) {
        info!(%state, "Authorization flow");
        if let Some(progress) = &self.progress {
            progress(state);
        }
    }

    /// Run the whole flow and persist the resulting record.
    pub async fn run(&self) -> AuthResult<TokenRecord> {
        self.enter(FlowState::Discovering);
        let metadata = discover_metadata(&self.http, &self.config.server_origin).await?;
        let (authorization_endpoint, token_endpoint) = metadata.required_endpoints()?;

        let redirect_uri = self.config.redirect_uri();
        let (client_id, client_secret) = match self
            .reusable_client(authorization_endpoint, token_endpoint)
            .await
        {
            Some(credentials) => credentials,
            None => {
                self.enter(FlowState::Registering);
                let endpoint = metadata
                    .registration_endpoint()
                    .ok_or(AuthError::NoClientCredentials)?;
                let registration = register_client(
                    &self.http,
                    endpoint,
                    &self.config.client_name,
                    std::slice::from_ref(&redirect_uri),
                )
                .await?;
                (
                    registration.client_id,
                    registration.client_secret.unwrap_or_default(),
                )
            }
        };

        let verifier = pkce::generate_code_verifier();
        let state = pkce::generate_state();
        let challenge = pkce::code_challenge(&verifier);
        let auth_url = build_authorization_url(
            authorization_endpoint,
            &client_id,
            &redirect_uri,
            &self.config.scope,
            &state,
            &challenge,
        )?;

        self.enter(FlowState::AwaitingCallback);
        // Listen before the browser can possibly redirect
        let listener =
            CallbackListener::bind(self.config.callback_port, self.config.callback_path.clone())
                .await?;
        if let Err(e) = self.browser.open(&auth_url) {
            warn!(error = %e, "Failed to open browser");
            self.browser.manual_fallback(&auth_url);
        }
        let code = listener
            .wait(&state, self.config.authorization_timeout)
            .await?;

        self.enter(FlowState::Exchanging);
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", client_id.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        if !client_secret.is_empty() {
            form.push(("client_secret", client_secret.as_str()));
        }
        let response: TokenResponse = post_form(&self.http, token_endpoint, &form)
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
        let access_token = response.access_token().ok_or_else(|| {
            AuthError::TokenExchange("response did not include an access_token".to_string())
        })?;

        let now = self.clock.now();
        let record = TokenRecord {
            access_token: access_token.to_string(),
            refresh_token: response.refresh_token().map(str::to_string),
            expires_at: response.expires_at(now.timestamp()),
            client_id,
            client_secret,
            token_endpoint: token_endpoint.to_string(),
            authorization_endpoint: authorization_endpoint.to_string(),
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            extra: Map::new(),
        };
        self.store.save(&record).await?;
        self.enter(FlowState::Persisted);

        Ok(record)
    }

    /// Stored client credentials, if they may be reused against these endpoints.
    async fn reusable_client(
        &self,
        authorization_endpoint: &str,
        token_endpoint: &str,
    ) -> Option<(String, String)> {
        let existing = self.store.load().await?;
        if !existing.has_client_credentials() {
            return None;
        }
        if self.config.validate_client_endpoints
            && (existing.authorization_endpoint != authorization_endpoint
                || existing.token_endpoint != token_endpoint)
        {
            info!(
                stored = %existing.token_endpoint,
                discovered = %token_endpoint,
                "Stored client belongs to different endpoints, registering a new one"
            );
            return None;
        }
        debug!(client_id = %existing.client_id, "Reusing stored OAuth client");
        Some((existing.client_id, existing.client_secret))
    }
}

impl fmt::Debug for AuthorizationFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationFlow")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
