//! Order repository: platform fetches backed by the SQLite cache.
//!
//! All order reads go through this module. Fetches pull from the platform,
//! coerce the response into a list, and replace the matching cache bucket
//! ("assigned" or "history") in one transaction. Mutations (day-cycle
//! actions, delivery completion) invalidate by refetching, never by editing
//! the cache in place.
//!
//! Concurrent refreshes are serialized by fetch tickets: each refresh takes
//! a ticket before the network call and only commits its response if no
//! newer ticket was issued while it was in flight. A stale response is
//! dropped and the current cache returned instead.

use rusqlite::{params, Connection};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::db::DbState;
use crate::timeline::OrderStatus;
use crate::{api, storage, value_f64, value_str};

// ---------------------------------------------------------------------------
// Fetch tickets
// ---------------------------------------------------------------------------

/// Monotonic ticket counter for one fetch scope.
struct Ticket {
    counter: AtomicU64,
}

impl Ticket {
    const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Take the next ticket. The holder of the highest ticket wins.
    fn issue(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.counter.load(Ordering::SeqCst) == ticket
    }
}

/// Tauri managed state for the order repository.
pub struct OrdersState {
    assigned: Ticket,
    history: Ticket,
}

impl OrdersState {
    pub fn new() -> Self {
        Self {
            assigned: Ticket::new(),
            history: Ticket::new(),
        }
    }
}

impl Default for OrdersState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// The order id across the shapes the platform emits.
pub fn order_id(order: &Value) -> Option<String> {
    value_str(order, &["id", "_id", "orderId"])
}

fn recipient_name(order: &Value) -> Option<String> {
    value_str(order, &["customerName", "recipientName"]).or_else(|| {
        order
            .get("customer")
            .and_then(|c| value_str(c, &["name", "fullName"]))
    })
}

fn recipient_phone(order: &Value) -> Option<String> {
    value_str(order, &["customerPhone", "recipientPhone", "phone"]).or_else(|| {
        order
            .get("customer")
            .and_then(|c| value_str(c, &["phone", "phoneNumber"]))
    })
}

fn delivery_address(order: &Value) -> Option<String> {
    match order.get("deliveryAddress").or_else(|| order.get("address")) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(obj @ Value::Object(_)) => Some(obj.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Cache access
// ---------------------------------------------------------------------------

/// Replace every row in `bucket` with the given orders, in one transaction.
pub fn cache_orders(conn: &Connection, bucket: &str, orders: &[Value]) -> Result<(), String> {
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin cache txn: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute("DELETE FROM orders WHERE bucket = ?1", params![bucket])
            .map_err(|e| format!("clear bucket: {e}"))?;

        for order in orders {
            let Some(id) = order_id(order) else {
                warn!("skipping cached order without an id");
                continue;
            };
            let items = order
                .get("items")
                .map(|i| i.to_string())
                .unwrap_or_else(|| "[]".to_string());
            conn.execute(
                "INSERT OR REPLACE INTO orders
                    (id, order_number, status, items, total_amount, delivery_address,
                     recipient_name, recipient_phone, bucket, raw,
                     prescription_url, prescription_verified,
                     created_at, updated_at, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                         COALESCE(?13, datetime('now')), datetime('now'), datetime('now'))",
                params![
                    id,
                    value_str(order, &["orderNumber", "order_number"]),
                    value_str(order, &["status"]).unwrap_or_else(|| "PENDING".to_string()),
                    items,
                    value_f64(order, &["totalAmount", "total_amount", "total"]),
                    delivery_address(order),
                    recipient_name(order),
                    recipient_phone(order),
                    bucket,
                    order.to_string(),
                    value_str(order, &["prescriptionUrl", "prescription_url"]),
                    order
                        .get("prescriptionVerified")
                        .and_then(Value::as_bool)
                        .unwrap_or(false) as i64,
                    value_str(order, &["createdAt", "created_at"]),
                ],
            )
            .map_err(|e| format!("cache order {id}: {e}"))?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit cache txn: {e}"))?;
            debug!(bucket, count = orders.len(), "order cache replaced");
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// Read a bucket from the cache, newest first, as the raw order JSON.
pub fn cached_orders(conn: &Connection, bucket: &str) -> Result<Vec<Value>, String> {
    let mut stmt = conn
        .prepare("SELECT raw FROM orders WHERE bucket = ?1 ORDER BY created_at DESC, id")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params![bucket], |row| row.get::<_, String>(0))
        .map_err(|e| e.to_string())?;
    Ok(rows
        .filter_map(|r| r.ok())
        .filter_map(|raw| serde_json::from_str::<Value>(&raw).ok())
        .collect())
}

/// Look up one cached order by id, regardless of bucket.
pub fn cached_order(conn: &Connection, order_id: &str) -> Option<Value> {
    conn.query_row(
        "SELECT raw FROM orders WHERE id = ?1",
        params![order_id],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|raw| serde_json::from_str(&raw).ok())
}

/// Count cached assigned orders by phase. Unknown statuses count as neither,
/// so a new server-side status never blocks the end-day gate by accident.
pub fn active_and_pending_counts(conn: &Connection) -> Result<(usize, usize), String> {
    let mut stmt = conn
        .prepare("SELECT status FROM orders WHERE bucket = 'assigned'")
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| e.to_string())?;

    let mut active = 0;
    let mut pending = 0;
    for raw in rows.filter_map(|r| r.ok()) {
        match OrderStatus::parse(&raw) {
            Ok(s) if s.is_active() => active += 1,
            Ok(s) if s.is_pending_assignment() => pending += 1,
            _ => {}
        }
    }
    Ok((active, pending))
}

/// The order currently being worked, if any: OUT_FOR_DELIVERY wins over
/// ASSIGNED, and ties break on the newest row.
pub fn active_order(conn: &Connection) -> Result<Option<Value>, String> {
    let assigned = cached_orders(conn, "assigned")?;
    let pick = |status: OrderStatus| {
        assigned.iter().find(|o| {
            value_str(o, &["status"])
                .and_then(|s| OrderStatus::parse(&s).ok())
                .map(|s| s == status)
                .unwrap_or(false)
        })
    };
    Ok(pick(OrderStatus::OutForDelivery)
        .or_else(|| pick(OrderStatus::Assigned))
        .cloned())
}

// ---------------------------------------------------------------------------
// Platform refreshes
// ---------------------------------------------------------------------------

/// Fetch the assigned orders from the platform and replace the cache bucket.
/// Returns the fresh list, or the cached one when the response lost its
/// ticket race.
pub async fn refresh_assigned(db: &DbState, state: &OrdersState) -> Result<Vec<Value>, String> {
    let executive_id = storage::executive_id().ok_or("Not logged in")?;
    let ticket = state.assigned.issue();

    let response = api::fetch_authenticated(
        &format!("/api/orders/assigned/{executive_id}"),
        "GET",
        None,
    )
    .await?;
    let orders = api::coerce_list(response);

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    if !state.assigned.is_latest(ticket) {
        warn!(ticket, "discarding stale assigned-orders response");
        return cached_orders(&conn, "assigned");
    }
    cache_orders(&conn, "assigned", &orders)?;
    info!(count = orders.len(), "assigned orders refreshed");
    Ok(orders)
}

/// Fetch the delivery history and replace the cache bucket. Same ticket
/// semantics as [`refresh_assigned`].
pub async fn refresh_history(db: &DbState, state: &OrdersState) -> Result<Vec<Value>, String> {
    let executive_id = storage::executive_id().ok_or("Not logged in")?;
    let ticket = state.history.issue();

    let response = api::fetch_authenticated(
        &format!("/api/orders/history/{executive_id}"),
        "GET",
        None,
    )
    .await?;
    let orders = api::coerce_list(response);

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    if !state.history.is_latest(ticket) {
        warn!(ticket, "discarding stale order-history response");
        return cached_orders(&conn, "history");
    }
    cache_orders(&conn, "history", &orders)?;
    info!(count = orders.len(), "order history refreshed");
    Ok(orders)
}

/// Refresh both buckets after a mutation. Errors are returned but the
/// caller's mutation has already succeeded server-side, so the cache is at
/// worst stale until the next poll.
pub async fn invalidate(db: &DbState, state: &OrdersState) -> Result<(), String> {
    refresh_assigned(db, state).await?;
    refresh_history(db, state).await?;
    Ok(())
}

/// Best-effort [`invalidate`] for callers whose mutation has already
/// succeeded server-side. A failed refetch must not turn that success into a
/// command error, so it is logged and the cache stays stale until the next
/// poll.
pub async fn invalidate_after_mutation(db: &DbState, state: &OrdersState) {
    if let Err(e) = invalidate(db, state).await {
        warn!("cache refetch after mutation failed: {e}");
    }
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

    fn order(id: &str, status: &str) -> Value {
        serde_json::json!({
            "id": id,
            "orderNumber": format!("CC-{id}"),
            "status": status,
            "items": [{"quantity": 1, "unitPrice": 100.0}],
            "totalAmount": 162.0,
            "customer": {"name": "Ravi", "phone": "9876543210"},
            "deliveryAddress": {"line1": "12 MG Road", "city": "Pune"},
        })
    }

    #[test]
    fn cache_replaces_the_whole_bucket() {
        let conn = test_conn();
        cache_orders(&conn, "assigned", &[order("a", "ASSIGNED"), order("b", "PENDING")])
            .unwrap();
        assert_eq!(cached_orders(&conn, "assigned").unwrap().len(), 2);

        // A later fetch with one order drops the vanished row
        cache_orders(&conn, "assigned", &[order("a", "OUT_FOR_DELIVERY")]).unwrap();
        let cached = cached_orders(&conn, "assigned").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0]["status"], "OUT_FOR_DELIVERY");
    }

    #[test]
    fn buckets_are_independent() {
        let conn = test_conn();
        cache_orders(&conn, "assigned", &[order("a", "ASSIGNED")]).unwrap();
        cache_orders(&conn, "history", &[order("h", "DELIVERED")]).unwrap();

        assert_eq!(cached_orders(&conn, "assigned").unwrap().len(), 1);
        assert_eq!(cached_orders(&conn, "history").unwrap().len(), 1);

        cache_orders(&conn, "assigned", &[]).unwrap();
        assert!(cached_orders(&conn, "assigned").unwrap().is_empty());
        assert_eq!(cached_orders(&conn, "history").unwrap().len(), 1);
    }

    #[test]
    fn lookup_by_id_returns_raw_order() {
        let conn = test_conn();
        cache_orders(&conn, "assigned", &[order("a", "ASSIGNED")]).unwrap();

        let found = cached_order(&conn, "a").unwrap();
        assert_eq!(found["orderNumber"], "CC-a");
        assert!(cached_order(&conn, "missing").is_none());
    }

    #[test]
    fn counts_split_active_from_pending() {
        let conn = test_conn();
        cache_orders(
            &conn,
            "assigned",
            &[
                order("a", "ASSIGNED"),
                order("b", "OUT_FOR_DELIVERY"),
                order("c", "PENDING"),
                order("d", "NEEDS_VERIFICATION"),
                order("e", "VERIFIED"),
                order("f", "SOME_FUTURE_STATUS"),
            ],
        )
        .unwrap();

        let (active, pending) = active_and_pending_counts(&conn).unwrap();
        assert_eq!(active, 2);
        assert_eq!(pending, 3);
    }

    #[test]
    fn active_order_prefers_out_for_delivery() {
        let conn = test_conn();
        cache_orders(
            &conn,
            "assigned",
            &[order("a", "ASSIGNED"), order("b", "OUT_FOR_DELIVERY")],
        )
        .unwrap();
        let active = active_order(&conn).unwrap().unwrap();
        assert_eq!(order_id(&active).as_deref(), Some("b"));

        cache_orders(&conn, "assigned", &[order("c", "PENDING")]).unwrap();
        assert!(active_order(&conn).unwrap().is_none());
    }

    #[test]
    fn orders_without_an_id_are_skipped_not_fatal() {
        let conn = test_conn();
        cache_orders(
            &conn,
            "assigned",
            &[serde_json::json!({"status": "PENDING"}), order("a", "ASSIGNED")],
        )
        .unwrap();
        assert_eq!(cached_orders(&conn, "assigned").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refetch_failure_after_a_mutation_is_swallowed() {
        use std::path::PathBuf;
        use std::sync::Mutex;

        let db_state = db::DbState {
            conn: Mutex::new(test_conn()),
            db_path: PathBuf::from(":memory:"),
        };
        let state = OrdersState::new();

        // No credentials are stored, so the refetch itself fails...
        assert!(invalidate(&db_state, &state).await.is_err());
        // ...but the post-mutation variant completes without an error.
        invalidate_after_mutation(&db_state, &state).await;
    }

    #[test]
    fn stale_ticket_loses_the_race() {
        let state = OrdersState::new();
        let first = state.assigned.issue();
        let second = state.assigned.issue();

        assert!(!state.assigned.is_latest(first));
        assert!(state.assigned.is_latest(second));
    }
}
