//! Access-token refresh.
//!
//! [`TokenManager`] hands out access tokens that stay valid for at least
//! [`EXPIRY_BUFFER_SECS`], refreshing them through the stored refresh token
//! when they get close to expiry. It re-reads the token file on every call.

use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult, RefreshFailure};
use crate::http::post_form;
use crate::store::{TokenRecord, TokenStore};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A token is treated as expired this many seconds before `expires_at`.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Token endpoint response (RFC 6749 §5.1), for both grants we use.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// The issued access token, if non-empty.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// The issued refresh token, if non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Absolute expiry for a token issued at `now`.
    pub fn expires_at(&self, now: i64) -> i64 {
        now + self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)
    }
}

/// Where the stored credentials stand, judged against the raw expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// No usable token file.
    NotAuthenticated,
    /// The access token is valid for `expires_in` more seconds, or for an
    /// unknown time when the record carries no expiry.
    Active { expires_in: Option<i64> },
    /// Expired `expired_for` seconds ago, but a refresh is possible.
    ExpiredRefreshable { expired_for: i64 },
    /// Expired and nothing can renew it.
    Expired { expired_for: i64 },
}

impl TokenStatus {
    /// Classify a record at time `now`.
    pub fn of(record: Option<&TokenRecord>, now: i64) -> Self {
        let Some(record) = record else {
            return Self::NotAuthenticated;
        };
        if record.access_token.is_empty() {
            return Self::NotAuthenticated;
        }

        if record.expires_at <= 0 {
            return Self::Active { expires_in: None };
        }

        let remaining = record.seconds_until_expiry(now);
        if remaining > 0 {
            Self::Active {
                expires_in: Some(remaining),
            }
        } else if record.can_refresh() {
            Self::ExpiredRefreshable {
                expired_for: -remaining,
            }
        } else {
            Self::Expired {
                expired_for: -remaining,
            }
        }
    }

    /// Whether a valid token is available now or after a refresh.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Active { .. } | Self::ExpiredRefreshable { .. })
    }
}

/// Issues valid access tokens from the token store.
pub struct TokenManager {
    store: TokenStore,
    http: Client,
    clock: Arc<dyn Clock>,
    keep_refresh_token_on_omit: bool,
}

impl TokenManager {
    /// Create a manager for the store and endpoints described by `config`.
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        Ok(Self {
            store: config.token_store()?,
            http: config.http_client()?,
            clock: Arc::new(SystemClock),
            keep_refresh_token_on_omit: config.keep_refresh_token_on_omit,
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Whether `record` must be refreshed before use at `now`.
    pub fn needs_refresh(record: &TokenRecord, now: i64) -> bool {
        now >= record.expires_at - EXPIRY_BUFFER_SECS
    }

    /// Current status of the stored credentials.
    pub async fn status(&self) -> TokenStatus {
        let record = self.store.load().await;
        TokenStatus::of(record.as_ref(), self.clock.unix_now())
    }

    /// Whether a token is available now or after a refresh.
    pub async fn is_authenticated(&self) -> bool {
        self.status().await.is_authenticated()
    }

    /// Return an access token valid for at least [`EXPIRY_BUFFER_SECS`].
    ///
    /// Refreshes first when the stored token is inside the buffer. Never
    /// returns a token already known to be expired.
    pub async fn access_token(&self) -> AuthResult<String> {
        let record = self
            .store
            .load()
            .await
            .ok_or_else(|| AuthError::NotAuthenticated("no stored tokens found".to_string()))?;

        if record.access_token.is_empty() {
            return Err(AuthError::NotAuthenticated(
                "token file has no access_token".to_string(),
            ));
        }

        if !Self::needs_refresh(&record, self.clock.unix_now()) {
            return Ok(record.access_token);
        }

        info!("Access token expired or about to, refreshing");
        let refreshed = self.refresh(&record).await?;
        Ok(refreshed.access_token)
    }

    /// Refresh whatever is currently on disk.
    pub async fn refresh_stored(&self) -> AuthResult<TokenRecord> {
        let record = self.store.load().await.ok_or(RefreshFailure::NoTokens)?;
        self.refresh(&record).await
    }

    /// Exchange the record's refresh token for a new access token and persist it.
    ///
    /// On any failure the file on disk is left as it was.
    pub async fn refresh(&self, record: &TokenRecord) -> AuthResult<TokenRecord> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(RefreshFailure::NoRefreshToken)?;
        if record.token_endpoint.is_empty() {
            return Err(RefreshFailure::NoTokenEndpoint.into());
        }

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", record.client_id.as_str()),
        ];
        if !record.client_secret.is_empty() {
            form.push(("client_secret", record.client_secret.as_str()));
        }

        debug!(endpoint = %record.token_endpoint, "Requesting refresh grant");
        let response: TokenResponse = post_form(&self.http, &record.token_endpoint, &form)
            .await
            .map_err(|e| RefreshFailure::Rejected(e.to_string()))?;

        let access_token = response.access_token().ok_or_else(|| {
            RefreshFailure::Rejected("response did not include an access_token".to_string())
        })?;

        let now = self.clock.unix_now();
        let mut updated = record.clone();
        updated.access_token = access_token.to_string();
        updated.expires_at = response.expires_at(now);
        match response.refresh_token() {
            Some(rotated) => updated.refresh_token = Some(rotated.to_string()),
            None if self.keep_refresh_token_on_omit => {}
            None => {
                warn!("Refresh response omitted refresh_token; clearing the stored one");
                updated.refresh_token = None;
            }
        }

        self.store.save(&updated).await?;
        info!(expires_in = updated.expires_at - now, "Access token refreshed");
        Ok(updated)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("store", &self.store)
            .field("keep_refresh_token_on_omit", &self.keep_refresh_token_on_omit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::sample_record;
    use tempfile::TempDir;

    const NOW: i64 = 1_700_000_000;

    fn manager(dir: &TempDir) -> TokenManager {
        let config = AuthConfig {
            token_path: Some(dir.path().join("tokens.json")),
            ..Default::default()
        };
        TokenManager::new(&config)
            .unwrap()
            .with_clock(Arc::new(ManualClock::at_unix(NOW)))
    }

    #[test]
    fn test_needs_refresh_buffer() {
        let record = TokenRecord {
            expires_at: NOW + 61,
            ..sample_record()
        };
        assert!(!TokenManager::needs_refresh(&record, NOW));

        let record = TokenRecord {
            expires_at: NOW + 60,
            ..sample_record()
        };
        assert!(TokenManager::needs_refresh(&record, NOW));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(TokenStatus::of(None, NOW), TokenStatus::NotAuthenticated);

        let active = TokenRecord {
            expires_at: NOW + 300,
            ..sample_record()
        };
        assert_eq!(
            TokenStatus::of(Some(&active), NOW),
            TokenStatus::Active {
                expires_in: Some(300)
            }
        );

        let no_expiry = TokenRecord {
            expires_at: 0,
            refresh_token: None,
            ..sample_record()
        };
        let status = TokenStatus::of(Some(&no_expiry), NOW);
        assert_eq!(status, TokenStatus::Active { expires_in: None });
        assert!(status.is_authenticated());

        let refreshable = TokenRecord {
            expires_at: NOW - 10,
            ..sample_record()
        };
        assert_eq!(
            TokenStatus::of(Some(&refreshable), NOW),
            TokenStatus::ExpiredRefreshable { expired_for: 10 }
        );

        let dead = TokenRecord {
            expires_at: NOW - 10,
            refresh_token: None,
            ..sample_record()
        };
        let status = TokenStatus::of(Some(&dead), NOW);
        assert_eq!(status, TokenStatus::Expired { expired_for: 10 });
        assert!(!status.is_authenticated());
    }

    #[test]
    fn test_token_response_expiry_default() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "a"}"#).unwrap();
        assert_eq!(response.expires_at(NOW), NOW + DEFAULT_EXPIRES_IN_SECS);

        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "a", "expires_in": 120}"#).unwrap();
        assert_eq!(response.expires_at(NOW), NOW + 120);
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let record = TokenRecord {
            expires_at: NOW + 600,
            // Unroutable: any network call would fail the test
            token_endpoint: "http://127.0.0.1:9/token".to_string(),
            ..sample_record()
        };
        manager.store().save(&record).await.unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "access-123");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_fails_fast() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let record = TokenRecord {
            expires_at: NOW - 1,
            refresh_token: None,
            ..sample_record()
        };
        manager.store().save(&record).await.unwrap();

        let err = manager.access_token().await.unwrap_err();
        assert!(err.requires_reauth());
        assert!(matches!(
            err,
            AuthError::Refresh(RefreshFailure::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_authenticated() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        assert!(matches!(
            manager.access_token().await.unwrap_err(),
            AuthError::NotAuthenticated(_)
        ));
        assert_eq!(manager.status().await, TokenStatus::NotAuthenticated);
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_refresh_stored_without_file() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        assert!(matches!(
            manager.refresh_stored().await.unwrap_err(),
            AuthError::Refresh(RefreshFailure::NoTokens)
        ));
    }

    #[tokio::test]
    async fn test_refresh_without_endpoint() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let record = TokenRecord {
            token_endpoint: String::new(),
            ..sample_record()
        };
        assert!(matches!(
            manager.refresh(&record).await.unwrap_err(),
            AuthError::Refresh(RefreshFailure::NoTokenEndpoint)
        ));
    }
}
