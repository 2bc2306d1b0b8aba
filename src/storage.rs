//! Secure credential storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. The bearer token never touches the
//! SQLite database or any flat file.

use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};

const SERVICE_NAME: &str = "curacart-courier";

// Credential keys
const KEY_API_URL: &str = "api_base_url";
const KEY_AUTH_TOKEN: &str = "auth_token";
const KEY_EXECUTIVE_ID: &str = "executive_id";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[KEY_API_URL, KEY_AUTH_TOKEN, KEY_EXECUTIVE_ID];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

fn has_credential(key: &str) -> bool {
    get_credential(key).is_some()
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// The app is considered configured when API URL, bearer token, and the
/// executive id are all present in the credential store.
pub fn is_configured() -> bool {
    has_credential(KEY_API_URL)
        && has_credential(KEY_AUTH_TOKEN)
        && has_credential(KEY_EXECUTIVE_ID)
}

pub fn api_url() -> Option<String> {
    get_credential(KEY_API_URL)
}

pub fn auth_token() -> Option<String> {
    get_credential(KEY_AUTH_TOKEN)
}

pub fn executive_id() -> Option<String> {
    get_credential(KEY_EXECUTIVE_ID)
}

pub fn set_api_url(url: &str) -> Result<(), String> {
    set_credential(KEY_API_URL, url)
}

pub fn set_auth_token(token: &str) -> Result<(), String> {
    set_credential(KEY_AUTH_TOKEN, token)
}

pub fn set_executive_id(id: &str) -> Result<(), String> {
    set_credential(KEY_EXECUTIVE_ID, id)
}

/// Drop the session credentials but keep the API URL, so the login screen
/// comes back pointed at the right environment.
pub fn clear_session() -> Result<(), String> {
    delete_credential(KEY_AUTH_TOKEN)?;
    delete_credential(KEY_EXECUTIVE_ID)?;
    Ok(())
}

/// Store credentials received during onboarding.
///
/// Expected JSON shape (camelCase):
/// ```json
/// {
///   "apiUrl": "...",
///   "authToken": "...",     // optional until first login
///   "executiveId": "..."    // optional until first login
/// }
/// ```
/// Alternatively a single `connectionCode` field carrying the base64 payload
/// from the onboarding email.
pub fn update_credentials(payload: &Value) -> Result<Value, String> {
    let mut api_url = payload
        .get("apiUrl")
        .or_else(|| payload.get("api_base_url"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let mut auth_token = payload
        .get("authToken")
        .or_else(|| payload.get("auth_token"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let mut executive_id = payload
        .get("executiveId")
        .or_else(|| payload.get("executive_id"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(code) = payload
        .get("connectionCode")
        .or_else(|| payload.get("connection_code"))
        .and_then(Value::as_str)
    {
        if let Some(decoded) = crate::api::decode_connection_code(code) {
            if api_url.is_none() {
                api_url = decoded
                    .get("url")
                    .and_then(Value::as_str)
                    .map(crate::api::normalize_api_url);
            }
            if auth_token.is_none() {
                auth_token = decoded
                    .get("token")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string());
            }
            if executive_id.is_none() {
                executive_id = decoded
                    .get("executiveId")
                    .or_else(|| decoded.get("eid"))
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string());
            }
        }
    }

    let api_url = api_url.ok_or("Missing required field: apiUrl")?;
    let normalized = crate::api::normalize_api_url(&api_url);
    if normalized.trim().is_empty() {
        return Err("Invalid apiUrl".to_string());
    }
    set_credential(KEY_API_URL, normalized.trim())?;

    if let Some(token) = auth_token.as_deref() {
        set_credential(KEY_AUTH_TOKEN, token)?;
    }
    if let Some(eid) = executive_id.as_deref() {
        set_credential(KEY_EXECUTIVE_ID, eid)?;
    }

    info!("credentials updated");
    Ok(serde_json::json!({ "success": true }))
}

/// Delete every stored credential (factory reset).
pub fn factory_reset() -> Result<Value, String> {
    info!("performing factory reset - deleting all credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(serde_json::json!({ "success": true }))
}
