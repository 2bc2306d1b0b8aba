//! Executive authentication against the CuraCart platform.
//!
//! Login is phone + password against `/api/auth/login`; the bearer token and
//! executive id land in the OS credential store (see `storage`). The session
//! itself is kept in-memory with inactivity and max-duration expiry, and a
//! failed-attempt lockout counter is persisted in the SQLite `local_settings`
//! table so restarting the app does not clear it.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{api, db, storage};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_INACTIVITY_MINUTES: i64 = 60;
/// A delivery shift can run a full day.
const SESSION_MAX_DURATION_HOURS: i64 = 14;
const LOCKOUT_ATTEMPTS_KEY: &str = "lockout_attempts";
const LOCKOUT_LAST_ATTEMPT_KEY: &str = "lockout_last_attempt";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An active executive session.
#[derive(Clone)]
struct ExecutiveSession {
    session_id: String,
    executive_id: String,
    name: String,
    phone: String,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ExecutiveSession {
    /// Check whether this session has expired (inactivity or max duration).
    fn is_expired(&self) -> bool {
        let now = Utc::now();
        if now >= self.expires_at {
            return true;
        }
        if now - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES) {
            return true;
        }
        false
    }

    /// Convert to the JSON shape the frontend expects.
    fn to_user_json(&self) -> Value {
        serde_json::json!({
            "executiveId": self.executive_id,
            "name": self.name,
            "phone": self.phone,
            "sessionId": self.session_id,
            "loginTime": self.login_time.to_rfc3339(),
        })
    }
}

/// Lockout tracking entry.
struct LockoutEntry {
    attempts: u32,
    last_attempt: DateTime<Utc>,
}

/// Tauri managed state for authentication.
pub struct AuthState {
    current: Mutex<Option<ExecutiveSession>>,
    lockout: Mutex<LockoutEntry>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            lockout: Mutex::new(LockoutEntry {
                attempts: 0,
                last_attempt: Utc::now(),
            }),
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract phone and password from the login payload `{"phone":..,"password":..}`.
fn extract_credentials(arg: &Value) -> Option<(String, String)> {
    let obj = arg.as_object()?;
    let phone = obj
        .get("phone")
        .or_else(|| obj.get("phoneNumber"))
        .and_then(Value::as_str)?
        .trim()
        .to_string();
    let password = obj.get("password").and_then(Value::as_str)?.to_string();
    Some((phone, password))
}

/// Check whether login is currently locked out.
fn check_lockout(lockout: &LockoutEntry) -> Result<(), String> {
    if lockout.attempts >= MAX_FAILED_ATTEMPTS {
        let elapsed = Utc::now() - lockout.last_attempt;
        if elapsed < Duration::minutes(LOCKOUT_MINUTES) {
            let remaining = LOCKOUT_MINUTES - elapsed.num_minutes();
            return Err(format!(
                "Too many failed attempts. Try again in {remaining} minute(s)."
            ));
        }
        // Lockout period has elapsed — will be reset on next successful login
    }
    Ok(())
}

/// Record a failed login attempt.
fn record_failure(lockout: &mut LockoutEntry) {
    lockout.attempts += 1;
    lockout.last_attempt = Utc::now();
    warn!(attempts = lockout.attempts, "failed login attempt");
}

/// Reset the lockout counter (on successful login).
fn reset_lockout(lockout: &mut LockoutEntry) {
    lockout.attempts = 0;
    lockout.last_attempt = Utc::now();
}

/// Load persisted lockout state from local_settings.
fn load_lockout_from_db(conn: &rusqlite::Connection) -> LockoutEntry {
    let attempts = db::get_setting(conn, "auth", LOCKOUT_ATTEMPTS_KEY)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    let last_attempt = db::get_setting(conn, "auth", LOCKOUT_LAST_ATTEMPT_KEY)
        .and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    LockoutEntry {
        attempts,
        last_attempt,
    }
}

/// Persist lockout state in local_settings.
fn persist_lockout_to_db(conn: &rusqlite::Connection, lockout: &LockoutEntry) {
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_ATTEMPTS_KEY,
        &lockout.attempts.to_string(),
    );
    let _ = db::set_setting(
        conn,
        "auth",
        LOCKOUT_LAST_ATTEMPT_KEY,
        &lockout.last_attempt.to_rfc3339(),
    );
}

/// Record a failed login toward the lockout counter, but only when the
/// platform actually rejected the credentials. Transport faults and server
/// errors never evaluated the password, so they must not lock anyone out.
fn note_login_failure(
    conn: &rusqlite::Connection,
    lockout: &mut LockoutEntry,
    failure: &api::ApiFailure,
) {
    if failure.is_rejection() {
        record_failure(lockout);
        persist_lockout_to_db(conn, lockout);
    }
}

/// Login-specific failure wording. A bare 401 on the login endpoint means
/// the credentials were wrong, not that a session expired.
fn login_error_message(failure: api::ApiFailure) -> String {
    match failure {
        api::ApiFailure::Http {
            status: 401,
            server_message: None,
        } => "Invalid phone or password".to_string(),
        other => other.into_message(),
    }
}

/// Create a new session and register it as current.
fn create_session(auth: &AuthState, executive_id: &str, name: &str, phone: &str) -> Value {
    let now = Utc::now();
    let session = ExecutiveSession {
        session_id: Uuid::new_v4().to_string(),
        executive_id: executive_id.to_string(),
        name: name.to_string(),
        phone: phone.to_string(),
        login_time: now,
        last_activity: now,
        expires_at: now + Duration::hours(SESSION_MAX_DURATION_HOURS),
    };

    let user_json = session.to_user_json();
    *auth.current.lock().unwrap() = Some(session);

    serde_json::json!({
        "success": true,
        "user": user_json,
    })
}

/// Get the current active session (if it exists and is not expired).
fn get_current_session(auth: &AuthState) -> Option<ExecutiveSession> {
    let current = auth.current.lock().unwrap();
    let session = current.as_ref()?.clone();
    if session.is_expired() {
        return None;
    }
    Some(session)
}

// ---------------------------------------------------------------------------
// Public command implementations
// ---------------------------------------------------------------------------

/// Handle auth:login — POST credentials to the platform, store the token,
/// create a session.
pub async fn login(
    arg0: Option<Value>,
    db: &db::DbState,
    auth: &AuthState,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing login argument")?;
    let (phone, password) =
        extract_credentials(&payload).ok_or("Invalid login payload: expected phone and password")?;

    if phone.is_empty() || password.is_empty() {
        return Err("Phone and password are required".into());
    }

    // Synchronize lockout state from durable storage before the network call.
    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        let persisted = load_lockout_from_db(&conn);
        let mut lockout = auth.lockout.lock().unwrap();
        *lockout = persisted;
        check_lockout(&lockout)?;
    }

    let api_url = storage::api_url().ok_or("App is not configured with an API URL")?;
    let body = serde_json::json!({ "phone": phone, "password": password });
    let result =
        api::fetch_from_platform_detailed(&api_url, None, "/api/auth/login", "POST", Some(body))
            .await;

    let response = match result {
        Ok(r) => r,
        Err(failure) => {
            let conn = db.conn.lock().map_err(|e| e.to_string())?;
            let mut lockout = auth.lockout.lock().unwrap();
            note_login_failure(&conn, &mut lockout, &failure);
            return Err(login_error_message(failure));
        }
    };

    let token = response
        .get("token")
        .and_then(Value::as_str)
        .ok_or("Login response is missing a token")?;
    let executive = response.get("executive").cloned().unwrap_or(Value::Null);
    let executive_id = executive
        .get("id")
        .or_else(|| executive.get("_id"))
        .and_then(Value::as_str)
        .ok_or("Login response is missing the executive id")?;
    let name = executive
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Executive");

    storage::set_auth_token(token)?;
    storage::set_executive_id(executive_id)?;

    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        let mut lockout = auth.lockout.lock().unwrap();
        reset_lockout(&mut lockout);
        persist_lockout_to_db(&conn, &lockout);
    }

    info!(executive_id = %executive_id, "executive login successful");
    Ok(create_session(auth, executive_id, name, &phone))
}

/// Handle auth:logout — invalidate the session and drop the stored token.
pub fn logout(auth: &AuthState) -> Result<Value, String> {
    let mut current = auth.current.lock().unwrap();
    if let Some(session) = current.take() {
        info!(session_id = %session.session_id, "session logged out");
    }
    storage::clear_session()?;
    Ok(serde_json::json!({ "success": true }))
}

/// Handle auth:get-current-session — return the current session or null.
pub fn get_session_json(auth: &AuthState) -> Value {
    match get_current_session(auth) {
        Some(s) => s.to_user_json(),
        None => Value::Null,
    }
}

/// Handle auth:validate-session.
pub fn validate_session(auth: &AuthState) -> Value {
    match get_current_session(auth) {
        Some(_) => serde_json::json!({ "valid": true }),
        None => {
            // Clean up expired session
            auth.current.lock().unwrap().take();
            serde_json::json!({ "valid": false, "reason": "Session expired or not found" })
        }
    }
}

/// Refresh the inactivity timer. Called on command traffic.
pub fn track_activity(auth: &AuthState) {
    let mut current = auth.current.lock().unwrap();
    if let Some(session) = current.as_mut() {
        session.last_activity = Utc::now();
    }
}
