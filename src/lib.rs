//! CuraCart Courier - Tauri v2 Backend
//!
//! This module registers all IPC command handlers that the React frontend
//! calls via `@tauri-apps/api/core::invoke()`. Command names use snake_case
//! derived from the web app's API surface (e.g. `auth:login` -> `auth_login`).

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod auth;
mod commands;
mod db;
mod earnings;
mod executive;
mod logs;
mod orders;
mod otp;
mod poll;
mod pricing;
mod storage;
mod timeline;

/// Poll interval for the background profile/orders refresh.
const POLL_INTERVAL_SECS: u64 = 20;

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_f64(v: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(n) = v.get(*key).and_then(|x| x.as_f64()) {
            return Some(n);
        }
    }
    None
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,curacart_courier_lib=debug"));

    // Prune old log files before setting up the appender
    logs::prune_old_logs();

    let log_dir = logs::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "courier");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes logs.
    // We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);

    info!("Starting CuraCart Courier v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .setup(|app| {
            use std::sync::Arc;
            use tauri::Manager;

            let app_data_dir = app
                .path()
                .app_data_dir()
                .expect("Failed to get app data dir");

            // Main DB connection for Tauri commands
            let db_state = db::init(&app_data_dir).expect("Failed to initialize database");
            app.manage(db_state);

            app.manage(auth::AuthState::new());
            app.manage(otp::OtpState::new());

            // Order repository state (shared between commands and the poll loop)
            let orders_state = Arc::new(orders::OrdersState::new());
            app.manage(orders_state.clone());

            let poll_state = Arc::new(poll::PollState::new());
            app.manage(poll_state.clone());

            // Second DB connection for the background poll loop
            let db_for_poll =
                Arc::new(db::init(&app_data_dir).expect("Failed to init poll database"));

            poll::start_poll_loop(
                app.handle().clone(),
                db_for_poll,
                orders_state,
                poll_state,
                POLL_INTERVAL_SECS,
            );

            info!("Database, auth, and poll loop registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Auth
            commands::auth::auth_login,
            commands::auth::auth_logout,
            commands::auth::auth_get_current_session,
            commands::auth::auth_validate_session,
            commands::auth::auth_track_activity,
            // Settings / onboarding
            commands::settings::settings_is_configured,
            commands::settings::settings_get_api_url,
            commands::settings::settings_update_credentials,
            commands::settings::settings_test_connection,
            commands::settings::settings_get_local,
            commands::settings::settings_set_local,
            commands::settings::settings_factory_reset,
            // Executive day cycle
            commands::executive::executive_get_profile,
            commands::executive::executive_get_status_view,
            commands::executive::executive_start_day,
            commands::executive::executive_mark_unavailable,
            commands::executive::executive_end_day,
            // Orders
            commands::orders::order_get_active,
            commands::orders::order_get_history,
            commands::orders::order_get_by_id,
            commands::orders::order_get_pricing,
            commands::orders::order_get_timeline,
            commands::orders::orders_refresh,
            // Delivery handover
            commands::delivery::delivery_initiate_handover,
            commands::delivery::delivery_submit_otp,
            commands::delivery::delivery_discard_pending,
            commands::delivery::delivery_get_pending,
            // Earnings
            commands::earnings::earnings_get_today,
            commands::earnings::earnings_get_for_day,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_str_skips_blank_and_missing_keys() {
        let v = serde_json::json!({"a": "  ", "b": "value", "c": 3});
        assert_eq!(value_str(&v, &["a", "b"]).as_deref(), Some("value"));
        assert_eq!(value_str(&v, &["missing", "c"]), None);
    }

    #[test]
    fn value_f64_reads_the_first_numeric_key() {
        let v = serde_json::json!({"x": "nan", "y": 2.5});
        assert_eq!(value_f64(&v, &["x", "y"]), Some(2.5));
        assert_eq!(value_f64(&v, &["missing"]), None);
    }
}
