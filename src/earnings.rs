//! Local earnings ledger.
//!
//! One row per completed delivery, written when the OTP handover succeeds.
//! The platform is the book of record for payouts; this ledger only feeds
//! the "today's earnings" card and works offline. A UNIQUE index on
//! order_id makes double-recording a completed order impossible.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::pricing;
use crate::{value_f64, value_str};

/// Record the earning for a completed delivery. Returns false when the
/// order was already recorded (retry after a flaky invalidation refetch).
pub fn record_earning(
    conn: &Connection,
    executive_id: &str,
    order: &Value,
) -> Result<bool, String> {
    let order_id = crate::orders::order_id(order).ok_or("Order has no id")?;

    let items = pricing::items_from_value(order.get("items").unwrap_or(&Value::Null));
    let computed = pricing::compute_order_pricing(&items);
    let delivery_fee = computed.delivery_fee;
    // The executive earns the delivery fee; free-delivery orders still pay
    // the platform's base rate.
    let total_earning = if delivery_fee > 0.0 {
        delivery_fee
    } else {
        pricing::DELIVERY_FEE
    };

    let details = serde_json::json!({
        "orderNumber": value_str(order, &["orderNumber", "order_number"]),
        "totalAmount": value_f64(order, &["totalAmount", "total_amount"]),
        "subtotal": computed.subtotal,
    });

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO earnings
                (id, executive_id, order_id, delivery_fee, total_earning, order_details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                executive_id,
                order_id,
                delivery_fee,
                total_earning,
                details.to_string(),
            ],
        )
        .map_err(|e| format!("record earning: {e}"))?;

    if inserted == 0 {
        warn!(order_id = %order_id, "earning already recorded, skipping");
        return Ok(false);
    }
    info!(order_id = %order_id, total_earning, "earning recorded");
    Ok(true)
}

/// Earnings summary for one calendar day (UTC), as the dashboard card JSON.
pub fn earnings_for_day(conn: &Connection, day: NaiveDate) -> Result<Value, String> {
    let date = day.format("%Y-%m-%d").to_string();
    let (deliveries, total_fees, total_earnings): (i64, f64, f64) = conn
        .query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(delivery_fee), 0),
                    COALESCE(SUM(total_earning), 0)
             FROM earnings
             WHERE substr(created_at, 1, 10) = ?1",
            params![date],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(|e| format!("earnings summary: {e}"))?;

    Ok(serde_json::json!({
        "date": date,
        "deliveries": deliveries,
        "totalFees": total_fees,
        "totalEarnings": total_earnings,
    }))
}

/// Today's summary (UTC).
pub fn earnings_today(conn: &Connection) -> Result<Value, String> {
    earnings_for_day(conn, Utc::now().date_naive())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        conn
    }

    fn order(id: &str, unit_price: f64) -> Value {
        serde_json::json!({
            "id": id,
            "orderNumber": format!("CC-{id}"),
            "status": "OUT_FOR_DELIVERY",
            "items": [{"quantity": 1, "unitPrice": unit_price}],
            "totalAmount": unit_price,
        })
    }

    #[test]
    fn records_delivery_fee_for_small_orders() {
        let conn = test_conn();
        let recorded = record_earning(&conn, "ex-1", &order("o1", 150.0)).unwrap();
        assert!(recorded);

        let today = earnings_today(&conn).unwrap();
        assert_eq!(today["deliveries"], 1);
        assert_eq!(today["totalFees"], 40.0);
        assert_eq!(today["totalEarnings"], 40.0);
    }

    #[test]
    fn free_delivery_orders_still_earn_the_base_rate() {
        let conn = test_conn();
        record_earning(&conn, "ex-1", &order("o1", 500.0)).unwrap();

        let today = earnings_today(&conn).unwrap();
        // The customer paid no delivery fee, the executive still earns one
        assert_eq!(today["totalFees"], 0.0);
        assert_eq!(today["totalEarnings"], 40.0);
    }

    #[test]
    fn duplicate_order_is_rejected_without_error() {
        let conn = test_conn();
        assert!(record_earning(&conn, "ex-1", &order("o1", 150.0)).unwrap());
        assert!(!record_earning(&conn, "ex-1", &order("o1", 150.0)).unwrap());

        let today = earnings_today(&conn).unwrap();
        assert_eq!(today["deliveries"], 1);
    }

    #[test]
    fn summary_accumulates_across_orders() {
        let conn = test_conn();
        record_earning(&conn, "ex-1", &order("o1", 150.0)).unwrap();
        record_earning(&conn, "ex-1", &order("o2", 500.0)).unwrap();
        record_earning(&conn, "ex-1", &order("o3", 80.0)).unwrap();

        let today = earnings_today(&conn).unwrap();
        assert_eq!(today["deliveries"], 3);
        assert_eq!(today["totalFees"], 80.0);
        assert_eq!(today["totalEarnings"], 120.0);
    }

    #[test]
    fn other_days_are_empty() {
        let conn = test_conn();
        record_earning(&conn, "ex-1", &order("o1", 150.0)).unwrap();

        let yesterday = Utc::now().date_naive().pred_opt().unwrap();
        let summary = earnings_for_day(&conn, yesterday).unwrap();
        assert_eq!(summary["deliveries"], 0);
        assert_eq!(summary["totalEarnings"], 0.0);
    }

    #[test]
    fn order_without_id_is_an_error() {
        let conn = test_conn();
        let err = record_earning(&conn, "ex-1", &serde_json::json!({"items": []})).unwrap_err();
        assert!(err.contains("no id"));
    }
}
