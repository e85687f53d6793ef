//! Small JSON-over-HTTP helpers shared by discovery, registration and the
//! token endpoint calls.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Longest slice of a failing response body kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// A failed request, already rendered for humans.
#[derive(Debug, Clone)]
pub(crate) struct HttpFailure(pub String);

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// GET `url` and decode the JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
) -> Result<T, HttpFailure> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| HttpFailure(format!("request to {url} failed: {e}")))?;
    decode(url, response).await
}

/// POST a form-encoded body to `url` and decode the JSON response.
pub(crate) async fn post_form<F: Serialize + ?Sized, T: DeserializeOwned>(
    client: &Client,
    url: &str,
    form: &F,
) -> Result<T, HttpFailure> {
    let response = client
        .post(url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| HttpFailure(format!("request to {url} failed: {e}")))?;
    decode(url, response).await
}

/// POST a JSON body to `url` and decode the JSON response.
pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    client: &Client,
    url: &str,
    body: &B,
) -> Result<T, HttpFailure> {
    let response = client
        .post(url)
        .header("Accept", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| HttpFailure(format!("request to {url} failed: {e}")))?;
    decode(url, response).await
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, HttpFailure> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| HttpFailure(format!("failed to read response from {url}: {e}")))?;

    if !status.is_success() {
        return Err(HttpFailure(format!(
            "HTTP {} from {}: {}",
            status.as_u16(),
            url,
            truncate(&body, ERROR_BODY_LIMIT)
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| HttpFailure(format!("invalid JSON from {url}: {e}")))
}

/// Cut `s` to at most `max` characters without splitting a code point.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
