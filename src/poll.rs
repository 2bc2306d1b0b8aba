//! Background polling loop.
//!
//! The platform has no push channel, so the app polls: each cycle refetches
//! the executive profile and the assigned orders, then emits Tauri events so
//! the renderer stays event-driven instead of polling over IPC. Fetch errors
//! are logged and the loop continues; an auth failure emits `session_expired`
//! so the frontend can route back to login.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tauri::{AppHandle, Emitter};
use tracing::{info, warn};

use chrono::Utc;

use crate::db::DbState;
use crate::orders::OrdersState;
use crate::{api, storage};

/// Managed state for the background poll loop.
pub struct PollState {
    pub is_running: Arc<AtomicBool>,
    pub last_poll: Arc<Mutex<Option<String>>>,
}

impl PollState {
    pub fn new() -> Self {
        Self {
            is_running: Arc::new(AtomicBool::new(false)),
            last_poll: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

fn is_auth_failure(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("session expired") || lower.contains("not authorized")
}

/// Fetch the executive profile from the platform.
pub async fn fetch_profile() -> Result<Value, String> {
    let executive_id = storage::executive_id().ok_or("Not logged in")?;
    api::fetch_authenticated(&format!("/api/executives/{executive_id}"), "GET", None).await
}

/// One poll cycle: profile, then assigned orders. Returns the first auth
/// failure encountered so the loop can surface it.
async fn run_poll_cycle(
    app: &AppHandle,
    db: &DbState,
    orders_state: &OrdersState,
) -> Result<(), String> {
    match fetch_profile().await {
        Ok(profile) => {
            let _ = app.emit("executive_updated", &profile);
        }
        Err(e) => {
            if is_auth_failure(&e) {
                return Err(e);
            }
            warn!("profile poll failed: {e}");
        }
    }

    match crate::orders::refresh_assigned(db, orders_state).await {
        Ok(orders) => {
            let _ = app.emit("orders_updated", serde_json::json!({ "orders": orders }));
        }
        Err(e) => {
            if is_auth_failure(&e) {
                return Err(e);
            }
            warn!("assigned orders poll failed: {e}");
        }
    }

    Ok(())
}

/// Start the background poll loop. Spawns a tokio task that runs every
/// `interval_secs` seconds while credentials are present.
pub fn start_poll_loop(
    app: AppHandle,
    db: Arc<DbState>,
    orders_state: Arc<OrdersState>,
    poll_state: Arc<PollState>,
    interval_secs: u64,
) {
    let is_running = poll_state.is_running.clone();
    let last_poll = poll_state.last_poll.clone();

    is_running.store(true, Ordering::SeqCst);

    tauri::async_runtime::spawn(async move {
        info!("Poll loop started (interval: {interval_secs}s)");

        loop {
            if !is_running.load(Ordering::SeqCst) {
                info!("Poll loop stopped");
                break;
            }

            tokio::time::sleep(Duration::from_secs(interval_secs)).await;

            if !is_running.load(Ordering::SeqCst) {
                break;
            }

            // Nothing to poll until onboarding and login are done.
            if !storage::is_configured() {
                continue;
            }

            match run_poll_cycle(&app, &db, &orders_state).await {
                Ok(()) => {
                    if let Ok(mut guard) = last_poll.lock() {
                        *guard = Some(Utc::now().to_rfc3339());
                    }
                }
                Err(e) => {
                    warn!("poll cycle hit auth failure: {e}");
                    let _ = app.emit("session_expired", serde_json::json!({ "reason": e }));
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_recognised() {
        assert!(is_auth_failure("Session expired, please log in again"));
        assert!(is_auth_failure("Executive account not authorized"));
        assert!(!is_auth_failure("Connection to https://x timed out"));
        assert!(!is_auth_failure("CuraCart server error (HTTP 500)"));
    }
}
