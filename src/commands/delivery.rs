use serde_json::Value;
use std::sync::Arc;
use tauri::Emitter;
use tracing::info;

use super::parse_order_id;
use crate::timeline::OrderStatus;
use crate::{db, earnings, orders, otp, storage, value_str};

fn cached_status(order: &Value) -> Result<OrderStatus, String> {
    let raw = value_str(order, &["status"]).ok_or("Order has no status")?;
    OrderStatus::parse(&raw)
}

/// Start the OTP handover: the platform sends a code to the recipient and
/// the app starts waiting for it. Only valid while the order is out for
/// delivery.
#[tauri::command]
pub async fn delivery_initiate_handover(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    otp_state: tauri::State<'_, otp::OtpState>,
) -> Result<Value, String> {
    let order_id = parse_order_id(arg0)?;

    let order = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        orders::cached_order(&conn, &order_id)
            .ok_or_else(|| format!("Order not found: {order_id}"))?
    };
    let status = cached_status(&order)?;
    if status != OrderStatus::OutForDelivery {
        return Err(format!(
            "Cannot start handover while order status is {}",
            status.as_str()
        ));
    }

    crate::api::fetch_authenticated(
        &format!("/api/orders/{order_id}/initiate-delivery-completion"),
        "POST",
        None,
    )
    .await?;

    let pending = otp_state.begin(&order_id);
    Ok(serde_json::json!({
        "success": true,
        "orderId": pending.order_id,
        "initiatedAt": pending.initiated_at.to_rfc3339(),
    }))
}

/// Submit the recipient's code. On success the platform marks the order
/// DELIVERED; the app records the earning and refetches the order cache.
#[tauri::command]
pub async fn delivery_submit_otp(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
    orders_state: tauri::State<'_, Arc<orders::OrdersState>>,
    otp_state: tauri::State<'_, otp::OtpState>,
    app: tauri::AppHandle,
) -> Result<Value, String> {
    let payload = arg0.clone().ok_or("Missing OTP payload")?;
    let order_id = parse_order_id(arg0)?;
    let code = payload
        .get("otp")
        .or_else(|| payload.get("code"))
        .and_then(Value::as_str)
        .ok_or("Missing OTP code")?
        .trim()
        .to_string();

    otp::check_code(&code)?;
    otp_state.require_pending(&order_id)?;

    // Snapshot the order before invalidation replaces the cache bucket.
    let order = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        orders::cached_order(&conn, &order_id)
            .ok_or_else(|| format!("Order not found: {order_id}"))?
    };

    crate::api::fetch_authenticated(
        &format!("/api/orders/{order_id}/complete-delivery-with-otp"),
        "POST",
        Some(serde_json::json!({ "otp": code })),
    )
    .await?;
    info!(order_id = %order_id, "delivery completed via OTP");
    otp_state.clear();

    let earning_recorded = {
        let executive_id = storage::executive_id().ok_or("Not logged in")?;
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        earnings::record_earning(&conn, &executive_id, &order)?
    };

    // The delivery is complete server-side; a failed refetch must not make
    // this command report failure.
    orders::invalidate_after_mutation(&db, &orders_state).await;
    let _ = app.emit("delivery_completed", serde_json::json!({ "orderId": order_id }));

    Ok(serde_json::json!({
        "success": true,
        "orderId": order_id,
        "earningRecorded": earning_recorded,
    }))
}

/// Drop the pending handover locally. The platform expects no abort call;
/// the unused code simply expires server-side.
#[tauri::command]
pub async fn delivery_discard_pending(
    otp_state: tauri::State<'_, otp::OtpState>,
) -> Result<Value, String> {
    otp_state.clear();
    Ok(serde_json::json!({ "success": true }))
}

/// The pending handover, if any, so the OTP screen survives a reload.
#[tauri::command]
pub async fn delivery_get_pending(
    otp_state: tauri::State<'_, otp::OtpState>,
) -> Result<Value, String> {
    Ok(match otp_state.current() {
        Some(p) => serde_json::json!({
            "orderId": p.order_id,
            "initiatedAt": p.initiated_at.to_rfc3339(),
        }),
        None => Value::Null,
    })
}
