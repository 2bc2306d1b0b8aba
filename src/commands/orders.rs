use serde_json::Value;
use std::sync::Arc;
use tauri::Emitter;

use super::parse_order_id;
use crate::{db, orders, pricing, timeline, value_str};

/// Assigned orders plus the currently worked one, refreshed from the
/// platform (cache fallback on network failure).
#[tauri::command]
pub async fn order_get_active(
    db: tauri::State<'_, db::DbState>,
    orders_state: tauri::State<'_, Arc<orders::OrdersState>>,
) -> Result<Value, String> {
    let assigned = match orders::refresh_assigned(&db, &orders_state).await {
        Ok(list) => list,
        Err(_) => {
            let conn = db.conn.lock().map_err(|e| e.to_string())?;
            orders::cached_orders(&conn, "assigned")?
        }
    };
    let active = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        orders::active_order(&conn)?
    };
    Ok(serde_json::json!({
        "orders": assigned,
        "activeOrder": active,
    }))
}

/// Delivery history, newest first.
#[tauri::command]
pub async fn order_get_history(
    db: tauri::State<'_, db::DbState>,
    orders_state: tauri::State<'_, Arc<orders::OrdersState>>,
) -> Result<Value, String> {
    let history = match orders::refresh_history(&db, &orders_state).await {
        Ok(list) => list,
        Err(_) => {
            let conn = db.conn.lock().map_err(|e| e.to_string())?;
            orders::cached_orders(&conn, "history")?
        }
    };
    Ok(serde_json::json!({ "orders": history }))
}

/// One cached order by id, or null.
#[tauri::command]
pub async fn order_get_by_id(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let order_id = parse_order_id(arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(orders::cached_order(&conn, &order_id).unwrap_or(Value::Null))
}

/// Pricing breakdown for one cached order.
#[tauri::command]
pub async fn order_get_pricing(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let order_id = parse_order_id(arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let order = orders::cached_order(&conn, &order_id)
        .ok_or_else(|| format!("Order not found: {order_id}"))?;
    Ok(pricing::pricing_json(&order))
}

/// Progress timeline for one cached order.
#[tauri::command]
pub async fn order_get_timeline(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let order_id = parse_order_id(arg0)?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let order = orders::cached_order(&conn, &order_id)
        .ok_or_else(|| format!("Order not found: {order_id}"))?;
    let status_raw = value_str(&order, &["status"]).ok_or("Order has no status")?;
    let status = timeline::OrderStatus::parse(&status_raw)?;
    Ok(timeline::timeline_json(status))
}

/// Force-refresh both cache buckets and notify the renderer.
#[tauri::command]
pub async fn orders_refresh(
    db: tauri::State<'_, db::DbState>,
    orders_state: tauri::State<'_, Arc<orders::OrdersState>>,
    app: tauri::AppHandle,
) -> Result<Value, String> {
    orders::invalidate(&db, &orders_state).await?;
    let (assigned, history) = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        (
            orders::cached_orders(&conn, "assigned")?,
            orders::cached_orders(&conn, "history")?,
        )
    };
    let _ = app.emit("orders_updated", serde_json::json!({ "orders": assigned }));
    Ok(serde_json::json!({
        "orders": assigned,
        "history": history,
    }))
}
