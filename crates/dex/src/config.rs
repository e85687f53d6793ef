//! Configuration for the dex CLI.
//!
//! Sources, later ones winning:
//!
//! 1. Built-in defaults (see [`AuthConfig`] and [`McpConfig`])
//! 2. Global config: `config.json` or `config.jsonc` in `~/.config/dex`
//!    (platform config dir as fallback), or the file given with `--config`
//! 3. Environment overrides: `DEX_GRANOLA_*` variables
//!
//! Config files may contain `//` and `/* */` comments.

use anyhow::{Context, Result};
use dex_auth::AuthConfig;
use dex_mcp::McpConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the authorization server origin.
pub const ENV_ORIGIN: &str = "DEX_GRANOLA_ORIGIN";
/// Overrides the MCP endpoint URL.
pub const ENV_MCP_URL: &str = "DEX_GRANOLA_MCP_URL";
/// Overrides the token file location.
pub const ENV_TOKEN_FILE: &str = "DEX_GRANOLA_TOKEN_FILE";
/// Overrides the OAuth callback port.
pub const ENV_CALLBACK_PORT: &str = "DEX_GRANOLA_CALLBACK_PORT";
/// Overrides where the Granola desktop app's cache is looked for.
pub const ENV_DESKTOP_CACHE: &str = "DEX_GRANOLA_DESKTOP_CACHE";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DexConfig {
    /// Write logs to the per-user log directory instead of stderr.
    pub log_file: bool,

    /// Granola connection settings.
    pub granola: GranolaConfig,
}

/// The `granola` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GranolaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_port: Option<u16>,

    /// Granola desktop cache file, used to tell whether Granola is installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desktop_cache: Option<PathBuf>,

    /// Keep the old refresh token when a refresh response omits one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_refresh_token_on_omit: Option<bool>,
}

impl DexConfig {
    /// Load configuration from `explicit`, or from the global config dir.
    ///
    /// A missing global file is not an error; a missing explicit one is.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_file(path).await?,
            None => match Self::global_config_file() {
                Some(path) => Self::load_file(&path).await?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Get the global config directory.
    ///
    /// On Unix, prefers `~/.config/dex` (where the token file also lives)
    /// over the platform-specific directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                let xdg_config = home.join(".config").join("dex");
                if xdg_config.exists() {
                    return Some(xdg_config);
                }
            }
        }

        dirs::config_dir().map(|d| d.join("dex"))
    }

    fn global_config_file() -> Option<PathBuf> {
        let dir = Self::global_config_dir()?;
        ["config.json", "config.jsonc"]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse_jsonc(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse JSON with comments.
    pub fn parse_jsonc(content: &str) -> Result<Self> {
        let stripped = strip_comments(content);
        if stripped.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&stripped)?)
    }

    /// Apply `DEX_GRANOLA_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(origin) = var(ENV_ORIGIN) {
            self.granola.origin = Some(origin);
        }
        if let Some(url) = var(ENV_MCP_URL) {
            self.granola.mcp_url = Some(url);
        }
        if let Some(path) = var(ENV_TOKEN_FILE) {
            self.granola.token_file = Some(PathBuf::from(path));
        }
        if let Some(port) = var(ENV_CALLBACK_PORT) {
            let port = port
                .trim()
                .parse()
                .with_context(|| format!("{ENV_CALLBACK_PORT} is not a valid port: {port}"))?;
            self.granola.callback_port = Some(port);
        }
        if let Some(path) = var(ENV_DESKTOP_CACHE) {
            self.granola.desktop_cache = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Settings for the OAuth flow and token refresh.
    pub fn auth_config(&self) -> AuthConfig {
        let granola = &self.granola;
        let defaults = AuthConfig::default();
        AuthConfig {
            server_origin: granola
                .origin
                .clone()
                .map(|o| o.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_origin),
            callback_port: granola.callback_port.unwrap_or(defaults.callback_port),
            token_path: granola.token_file.clone(),
            keep_refresh_token_on_omit: granola
                .keep_refresh_token_on_omit
                .unwrap_or(defaults.keep_refresh_token_on_omit),
            ..defaults
        }
    }

    /// Settings for the MCP client.
    pub fn mcp_config(&self) -> McpConfig {
        match &self.granola.mcp_url {
            Some(url) => McpConfig::with_endpoint(url.clone()),
            None => McpConfig::default(),
        }
    }

    /// Where the Granola desktop app keeps its cache on this platform.
    pub fn desktop_cache_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.granola.desktop_cache {
            return Some(path.clone());
        }
        let home = dirs::home_dir()?;

        #[cfg(target_os = "macos")]
        let base = home.join("Library/Application Support");

        #[cfg(target_os = "windows")]
        let base = std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("AppData/Roaming"));

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let base = home.join(".config");

        Some(base.join("Granola").join("cache-v3.json"))
    }
}

/// Strip `//` and `/* */` comments outside of string literals.
fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(c);
            continue;
        }

        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => result.push(c),
        }
    }

    result
}
