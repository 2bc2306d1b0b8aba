//! CuraCart platform API client.
//!
//! Provides authenticated HTTP communication with the CuraCart platform, used
//! for login, executive day-cycle actions, order fetches, and the OTP
//! handover protocol.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::info;

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the platform URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_api_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    // Strip trailing slashes again (in case "/api/" was present)
    while url.ends_with('/') {
        url.pop();
    }

    url
}

/// Decode the onboarding connection code. Accepts either raw JSON or a
/// base64/base64url-encoded JSON payload.
pub fn decode_connection_code(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed).ok();
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }
    if compact.len() < 20 {
        return None;
    }

    let base64 = compact.replace('-', "+").replace('_', "/");
    let padded = format!(
        "{}{}",
        base64,
        "=".repeat((4usize.wrapping_sub(base64.len() % 4)) % 4)
    );
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach CuraCart at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid CuraCart URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: u16) -> String {
    match status {
        401 => "Session expired, please log in again".to_string(),
        403 => "Executive account not authorized".to_string(),
        404 => "CuraCart endpoint not found".to_string(),
        s if s >= 500 => format!("CuraCart server error (HTTP {s})"),
        s => format!("Unexpected response from CuraCart (HTTP {s})"),
    }
}

/// Why a platform request failed: either the request never completed, or the
/// platform answered with a non-success status.
#[derive(Debug)]
pub enum ApiFailure {
    /// No HTTP response was produced (connect failure, timeout, bad URL,
    /// unparseable body).
    Transport(String),
    /// The platform answered with a non-success status. `server_message` is
    /// the message the server supplied in its body, when it supplied one.
    Http {
        status: u16,
        server_message: Option<String>,
    },
}

impl ApiFailure {
    /// True when the platform actively rejected the request (4xx). Transport
    /// faults and 5xx responses say nothing about what was submitted.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (400..500).contains(status))
    }

    pub fn into_message(self) -> String {
        match self {
            Self::Transport(message) => message,
            Self::Http {
                status,
                server_message,
            } => server_message
                .unwrap_or_else(|| format!("{} (HTTP {status})", status_error(status))),
        }
    }
}

// ---------------------------------------------------------------------------
// Response shape coercion
// ---------------------------------------------------------------------------

/// The order endpoints return a bare array for multiple results but a single
/// object when exactly one matches. Coerce both shapes (and common envelope
/// keys) into a plain array so the repository layer sees one format.
pub fn coerce_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(ref map) => {
            for key in ["orders", "data", "results"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    return items.clone();
                }
            }
            vec![value]
        }
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Test connectivity to the platform with a lightweight health-check.
pub async fn test_connectivity(api_url: &str) -> ConnectivityResult {
    let url = normalize_api_url(api_url);
    let health_url = format!("{url}/api/health");

    let client = match Client::builder().timeout(CONNECTIVITY_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(format!("Failed to create HTTP client: {e}")),
            };
        }
    };

    let start = Instant::now();

    let resp = match client.get(&health_url).send().await {
        Ok(r) => r,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(friendly_error(&url, &e)),
            };
        }
    };

    let latency = start.elapsed().as_millis() as u64;
    let status = resp.status();

    if status.is_success() {
        info!(latency_ms = latency, "connectivity test passed");
        ConnectivityResult {
            success: true,
            latency_ms: Some(latency),
            error: None,
        }
    } else {
        ConnectivityResult {
            success: false,
            latency_ms: Some(latency),
            error: Some(status_error(status.as_u16())),
        }
    }
}

// ---------------------------------------------------------------------------
// Generic authenticated fetch
// ---------------------------------------------------------------------------

/// Perform an HTTP request to the platform, with an optional bearer token,
/// keeping the failure cause structured so callers can tell a rejection from
/// a transport fault.
///
/// `path` should include the leading slash, e.g. `/api/orders/assigned/x`.
/// `method` is an HTTP verb string: "GET", "POST", "PUT", "PATCH", "DELETE".
pub async fn fetch_from_platform_detailed(
    api_url: &str,
    token: Option<&str>,
    path: &str,
    method: &str,
    body: Option<Value>,
) -> Result<Value, ApiFailure> {
    let base = normalize_api_url(api_url);
    let full_url = format!("{base}{path}");

    let http_method: Method = method
        .to_uppercase()
        .parse()
        .map_err(|_| ApiFailure::Transport(format!("Invalid HTTP method: {method}")))?;

    let client = Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| ApiFailure::Transport(format!("Failed to create HTTP client: {e}")))?;

    let mut req = client
        .request(http_method, &full_url)
        .header("Content-Type", "application/json");

    if let Some(token) = token {
        req = req.header("Authorization", format!("Bearer {token}"));
    }

    if let Some(b) = body {
        // If the JavaScript frontend pre-serialized the body via JSON.stringify(),
        // it arrives as Value::String containing JSON. Parse it back to avoid
        // double-serialization by reqwest's .json() method.
        let resolved = if let Value::String(ref s) = b {
            serde_json::from_str::<Value>(s).unwrap_or(b)
        } else {
            b
        };
        req = req.json(&resolved);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| ApiFailure::Transport(friendly_error(&base, &e)))?;
    let status = resp.status().as_u16();

    if !resp.status().is_success() {
        // Surface the server's own message when it sends one. The OTP verify
        // endpoint in particular returns a specific "Invalid OTP" error.
        let body_text = resp.text().await.unwrap_or_default();
        let server_message = if let Ok(json) = serde_json::from_str::<Value>(&body_text) {
            json.get("error")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(|s| s.to_string())
        } else if !body_text.trim().is_empty() {
            Some(format!(
                "{} (HTTP {status}): {}",
                status_error(status),
                body_text.trim()
            ))
        } else {
            None
        };
        return Err(ApiFailure::Http {
            status,
            server_message,
        });
    }

    // Return the JSON body, or null for empty 204 responses.
    let body_text = resp.text().await.unwrap_or_default();
    if body_text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body_text)
        .map_err(|e| ApiFailure::Transport(format!("Invalid JSON from CuraCart: {e}")))
}

/// [`fetch_from_platform_detailed`] with the failure flattened to a message.
pub async fn fetch_from_platform(
    api_url: &str,
    token: Option<&str>,
    path: &str,
    method: &str,
    body: Option<Value>,
) -> Result<Value, String> {
    fetch_from_platform_detailed(api_url, token, path, method, body)
        .await
        .map_err(ApiFailure::into_message)
}

/// Authenticated fetch using the stored credentials.
pub async fn fetch_authenticated(
    path: &str,
    method: &str,
    body: Option<Value>,
) -> Result<Value, String> {
    let api_url = crate::storage::api_url().ok_or("App is not configured with an API URL")?;
    let token = crate::storage::auth_token().ok_or("Not logged in")?;
    fetch_from_platform(&api_url, Some(&token), path, method, body).await
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_strips_api_suffix() {
        assert_eq!(
            normalize_api_url("curacart.example.com/api/"),
            "https://curacart.example.com"
        );
        assert_eq!(
            normalize_api_url("localhost:3000"),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_api_url("https://curacart.example.com///"),
            "https://curacart.example.com"
        );
    }

    #[test]
    fn connection_code_accepts_raw_json_and_base64() {
        let payload = r#"{"url":"curacart.example.com","token":"t0k","executiveId":"ex-1"}"#;
        let from_json = decode_connection_code(payload).unwrap();
        assert_eq!(from_json["executiveId"], "ex-1");

        let encoded = BASE64_STANDARD.encode(payload);
        let from_b64 = decode_connection_code(&encoded).unwrap();
        assert_eq!(from_b64["token"], "t0k");

        assert!(decode_connection_code("short").is_none());
    }

    #[test]
    fn coerce_list_handles_every_shape() {
        let arr = serde_json::json!([{"id": "a"}, {"id": "b"}]);
        assert_eq!(coerce_list(arr).len(), 2);

        // A single object is wrapped, not dropped
        let single = serde_json::json!({"id": "a"});
        let coerced = coerce_list(single);
        assert_eq!(coerced.len(), 1);
        assert_eq!(coerced[0]["id"], "a");

        // Envelope keys unwrap to the inner array
        let envelope = serde_json::json!({"orders": [{"id": "a"}]});
        assert_eq!(coerce_list(envelope).len(), 1);

        assert!(coerce_list(Value::Null).is_empty());
    }

    #[test]
    fn only_4xx_responses_count_as_rejections() {
        let unauthorized = ApiFailure::Http {
            status: 401,
            server_message: None,
        };
        let forbidden = ApiFailure::Http {
            status: 403,
            server_message: Some("Executive suspended".into()),
        };
        let server_error = ApiFailure::Http {
            status: 500,
            server_message: None,
        };
        let timeout = ApiFailure::Transport("Connection to https://x timed out".into());

        assert!(unauthorized.is_rejection());
        assert!(forbidden.is_rejection());
        assert!(!server_error.is_rejection());
        assert!(!timeout.is_rejection());
    }

    #[test]
    fn failure_message_prefers_the_server_wording() {
        let with_message = ApiFailure::Http {
            status: 400,
            server_message: Some("Invalid OTP".into()),
        };
        assert_eq!(with_message.into_message(), "Invalid OTP");

        let bare = ApiFailure::Http {
            status: 401,
            server_message: None,
        };
        assert_eq!(
            bare.into_message(),
            "Session expired, please log in again (HTTP 401)"
        );

        let transport = ApiFailure::Transport("Cannot reach CuraCart at https://x".into());
        assert_eq!(
            transport.into_message(),
            "Cannot reach CuraCart at https://x"
        );
    }
}
