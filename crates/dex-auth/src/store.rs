//! Token record storage.
//!
//! One JSON document on disk holds the current credentials. The file is the
//! only source of truth: callers re-read it before every decision instead of
//! caching it, because several short-lived processes share it.

use crate::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The persisted credential record.
///
/// Field names are read by other tools and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Bearer credential.
    #[serde(default)]
    pub access_token: String,
    /// Used to mint new access tokens. `null` means re-authorization on expiry.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds; authoritative expiry instant.
    #[serde(default)]
    pub expires_at: i64,
    /// Client id from Dynamic Client Registration.
    #[serde(default)]
    pub client_id: String,
    /// Client secret from Dynamic Client Registration (may be empty).
    #[serde(default)]
    pub client_secret: String,
    /// Cached discovery result, needed to refresh without re-discovery.
    #[serde(default)]
    pub token_endpoint: String,
    /// Cached discovery result.
    #[serde(default)]
    pub authorization_endpoint: String,
    /// ISO-8601 creation time, diagnostic only.
    #[serde(default)]
    pub created_at: String,
    /// Fields written by someone else; carried through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenRecord {
    /// Whether a refresh grant can be attempted.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
            && !self.token_endpoint.is_empty()
    }

    /// Whether the stored client registration is complete enough to reuse.
    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Seconds until expiry (negative once expired).
    pub fn seconds_until_expiry(&self, now: i64) -> i64 {
        self.expires_at - now
    }
}

/// File-backed store for the single [`TokenRecord`].
pub struct TokenStore {
    /// Path to the token file.
    path: PathBuf,
}

impl TokenStore {
    /// Create a store at the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> AuthResult<Self> {
        let path = crate::default_token_path().ok_or(AuthError::NoConfigDir)?;
        Ok(Self { path })
    }

    /// Create a store with a custom path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a token file exists at all.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the record, distinguishing "absent" from "corrupt".
    ///
    /// Returns `Ok(None)` only when the file does not exist. An empty file
    /// is a truncated write and reads as corrupt.
    pub async fn read(&self) -> AuthResult<Option<TokenRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Read the record, treating any failure as "no tokens".
    ///
    /// A half-written or hand-edited file must never crash a caller.
    pub async fn load(&self) -> Option<TokenRecord> {
        match self.read().await {
            Ok(record) => record,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Ignoring unreadable token file");
                None
            }
        }
    }

    /// Write the record, replacing the file atomically.
    pub async fn save(&self, record: &TokenRecord) -> AuthResult<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(record)?;

        // Write next to the target, then rename over it
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&tmp, perms).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(AuthError::Permissions(format!(
                    "Failed to set permissions on {:?}: {}",
                    tmp, e
                )));
            }
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = ?self.path, "Wrote token file");
        Ok(())
    }

    /// Delete the token file.
    ///
    /// Returns `true` if a file was removed, `false` if there was none.
    pub async fn delete(&self) -> AuthResult<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = ?self.path, "Deleted token file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tokens.json".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> TokenRecord {
    TokenRecord {
        access_token: "access-123".to_string(),
        refresh_token: Some("refresh-456".to_string()),
        expires_at: 1_700_003_600,
        client_id: "client-abc".to_string(),
        client_secret: "secret-def".to_string(),
        token_endpoint: "https://auth.example.com/token".to_string(),
        authorization_endpoint: "https://auth.example.com/authorize".to_string(),
        created_at: "2023-11-14T22:13:20.000Z".to_string(),
        extra: Map::new(),
    }
}
