//! Authorization-server discovery and Dynamic Client Registration.
//!
//! Discovery tries RFC 8414 first and falls back to OpenID Connect discovery.
//! Registration follows RFC 7591 with `client_secret_post` authentication.

use crate::error::{AuthError, AuthResult};
use crate::http::{get_json, post_json};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// RFC 8414 metadata document path.
pub const OAUTH_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// OpenID Connect discovery document path.
pub const OPENID_CONFIG_PATH: &str = "/.well-known/openid-configuration";

/// Authorization server metadata.
///
/// Only the endpoints the flow needs are typed; the rest of the document is
/// kept in `extra` for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Where the browser is sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// Where codes and refresh tokens are exchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    /// Dynamic Client Registration endpoint, if the server supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// Everything else in the document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorizationServerMetadata {
    /// The authorization and token endpoints, or an error naming what's missing.
    pub fn required_endpoints(&self) -> AuthResult<(&str, &str)> {
        let authorization = non_empty(&self.authorization_endpoint).ok_or_else(|| {
            AuthError::InvalidMetadata("missing authorization_endpoint".to_string())
        })?;
        let token = non_empty(&self.token_endpoint)
            .ok_or_else(|| AuthError::InvalidMetadata("missing token_endpoint".to_string()))?;
        Ok((authorization, token))
    }

    /// The registration endpoint, if advertised and non-empty.
    pub fn registration_endpoint(&self) -> Option<&str> {
        non_empty(&self.registration_endpoint)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Credentials returned by Dynamic Client Registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientRegistration {
    /// Issued client identifier.
    #[serde(default)]
    pub client_id: String,
    /// Issued client secret; public clients get none.
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// RFC 7591 registration request body.
#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: &'a [String],
    grant_types: [&'static str; 2],
    response_types: [&'static str; 1],
    token_endpoint_auth_method: &'static str,
}

/// Fetch authorization server metadata for `origin`.
///
/// Any failure of the RFC 8414 document (network, non-2xx, bad JSON) falls
/// through to the OpenID document. Only when both fail is an error returned,
/// carrying both messages.
pub async fn discover_metadata(
    client: &Client,
    origin: &str,
) -> AuthResult<AuthorizationServerMetadata> {
    let origin = origin.trim_end_matches('/');

    let rfc8414_url = format!("{origin}{OAUTH_METADATA_PATH}");
    let rfc8414_err = match get_json::<AuthorizationServerMetadata>(client, &rfc8414_url).await {
        Ok(metadata) => {
            debug!(url = %rfc8414_url, "Discovered OAuth metadata");
            return Ok(metadata);
        }
        Err(e) => e,
    };
    warn!(error = %rfc8414_err, "RFC 8414 discovery failed, trying OpenID configuration");

    let openid_url = format!("{origin}{OPENID_CONFIG_PATH}");
    match get_json::<AuthorizationServerMetadata>(client, &openid_url).await {
        Ok(metadata) => {
            debug!(url = %openid_url, "Discovered OpenID configuration");
            Ok(metadata)
        }
        Err(openid_err) => Err(AuthError::Discovery {
            rfc8414: rfc8414_err.to_string(),
            openid: openid_err.to_string(),
        }),
    }
}

/// Register a new OAuth client (RFC 7591).
pub async fn register_client(
    client: &Client,
    registration_endpoint: &str,
    client_name: &str,
    redirect_uris: &[String],
) -> AuthResult<ClientRegistration> {
    let request = RegistrationRequest {
        client_name,
        redirect_uris,
        grant_types: ["authorization_code", "refresh_token"],
        response_types: ["code"],
        token_endpoint_auth_method: "client_secret_post",
    };

    let registration: ClientRegistration = post_json(client, registration_endpoint, &request)
        .await
        .map_err(|e| AuthError::Registration(e.to_string()))?;

    if registration.client_id.is_empty() {
        return Err(AuthError::Registration(
            "response did not include a client_id".to_string(),
        ));
    }

    info!(client_id = %registration.client_id, "Registered OAuth client");
    Ok(registration)
}
