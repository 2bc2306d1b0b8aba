use serde_json::Value;
use std::sync::Arc;
use tauri::Emitter;
use tracing::{info, warn};

use crate::executive::{self, ExecutiveAction};
use crate::{db, orders, poll, storage};

/// Current executive profile straight from the platform.
#[tauri::command]
pub async fn executive_get_profile() -> Result<Value, String> {
    poll::fetch_profile().await
}

/// Dashboard status view: message, primary action, end-day gate. Combines
/// the server-reported status with the cached order counts.
#[tauri::command]
pub async fn executive_get_status_view(
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let profile = poll::fetch_profile().await?;
    let status = executive::status_from_profile(&profile)?;

    let (active, pending) = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        orders::active_and_pending_counts(&conn)?
    };

    let view = executive::status_view(status, active, pending);
    let mut json = executive::status_view_json(&view);
    if let Value::Object(ref mut map) = json {
        map.insert("status".into(), Value::String(status.as_str().into()));
        map.insert("activeOrders".into(), active.into());
        map.insert("pendingOrders".into(), pending.into());
    }
    Ok(json)
}

/// Run one day-cycle action: guard it locally, POST it, then refetch both
/// the profile and the order cache. The server state is canonical; nothing
/// is updated optimistically.
async fn run_day_cycle_action(
    action: ExecutiveAction,
    db: &db::DbState,
    orders_state: &orders::OrdersState,
    app: &tauri::AppHandle,
) -> Result<Value, String> {
    let executive_id = storage::executive_id().ok_or("Not logged in")?;

    let profile = poll::fetch_profile().await?;
    let status = executive::status_from_profile(&profile)?;
    let (active, pending) = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        orders::active_and_pending_counts(&conn)?
    };
    executive::check_action(action, status, active, pending)?;

    let path = format!(
        "/api/executives/{executive_id}/{}",
        action.endpoint_segment()
    );
    crate::api::fetch_authenticated(&path, "POST", None).await?;
    info!(action = action.endpoint_segment(), "day-cycle action accepted");

    // Mutation done: refetch, never patch the cache by hand. The action has
    // already been accepted, so refetch failures are logged, not surfaced.
    orders::invalidate_after_mutation(db, orders_state).await;
    let fresh = match poll::fetch_profile().await {
        Ok(p) => p,
        Err(e) => {
            warn!("profile refetch after day-cycle action failed: {e}");
            profile
        }
    };
    let _ = app.emit("executive_updated", &fresh);
    Ok(fresh)
}

#[tauri::command]
pub async fn executive_start_day(
    db: tauri::State<'_, db::DbState>,
    orders_state: tauri::State<'_, Arc<orders::OrdersState>>,
    app: tauri::AppHandle,
) -> Result<Value, String> {
    run_day_cycle_action(ExecutiveAction::StartDay, &db, &orders_state, &app).await
}

#[tauri::command]
pub async fn executive_mark_unavailable(
    db: tauri::State<'_, db::DbState>,
    orders_state: tauri::State<'_, Arc<orders::OrdersState>>,
    app: tauri::AppHandle,
) -> Result<Value, String> {
    run_day_cycle_action(ExecutiveAction::MarkUnavailable, &db, &orders_state, &app).await
}

#[tauri::command]
pub async fn executive_end_day(
    db: tauri::State<'_, db::DbState>,
    orders_state: tauri::State<'_, Arc<orders::OrdersState>>,
    app: tauri::AppHandle,
) -> Result<Value, String> {
    run_day_cycle_action(ExecutiveAction::EndDay, &db, &orders_state, &app).await
}
