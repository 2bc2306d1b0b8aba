//! Order pricing projection.
//!
//! The platform bills a flat delivery surcharge under a free-delivery
//! threshold, a fixed platform fee, and 18% GST on the taxable amount. The
//! dashboard card, the history detail, and the order modal all display the
//! same breakdown, so the projection lives in exactly one pure function
//! instead of three drifting copies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Delivery surcharge applied when the subtotal is under the threshold.
pub const DELIVERY_FEE: f64 = 40.0;
/// Orders at or above this subtotal ship free.
pub const FREE_DELIVERY_THRESHOLD: f64 = 300.0;
/// Fixed platform fee charged on every order.
pub const PLATFORM_FEE: f64 = 10.0;
/// GST rate applied to subtotal + fees.
pub const TAX_RATE: f64 = 0.18;

/// One order line as supplied by the API. `total_price` is optional; when
/// absent the line total is quantity x unit price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default, alias = "product_id")]
    pub product_id: Option<String>,
    #[serde(default, alias = "product_name")]
    pub name: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default, alias = "unit_price", alias = "price")]
    pub unit_price: f64,
    #[serde(default, alias = "total_price")]
    pub total_price: Option<f64>,
}

fn default_quantity() -> f64 {
    1.0
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.total_price
            .unwrap_or(self.unit_price * self.quantity)
    }
}

/// The five derived pricing fields. Never persisted — recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPricing {
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub platform_fee: f64,
    pub tax: f64,
    pub total: f64,
}

/// Compute the full pricing breakdown from raw item lines.
///
/// Pure and idempotent. An empty item list yields subtotal 0 with the
/// delivery and platform fees still applied — callers that must match a
/// server-canonical total should go through [`resolve_display_total`].
pub fn compute_order_pricing(items: &[OrderItem]) -> OrderPricing {
    let subtotal: f64 = items.iter().map(OrderItem::line_total).sum();
    let delivery_fee = if subtotal < FREE_DELIVERY_THRESHOLD {
        DELIVERY_FEE
    } else {
        0.0
    };
    let platform_fee = PLATFORM_FEE;
    let taxable = subtotal + delivery_fee + platform_fee;
    let tax = taxable * TAX_RATE;
    OrderPricing {
        subtotal,
        delivery_fee,
        platform_fee,
        tax,
        total: taxable + tax,
    }
}

/// Headline total for display: the server-canonical `totalAmount` wins when
/// the order carries one, otherwise the local projection is used. The fee
/// breakdown rows always come from the projection.
pub fn resolve_display_total(server_total: Option<f64>, pricing: &OrderPricing) -> f64 {
    match server_total {
        Some(total) if total > 0.0 => total,
        _ => pricing.total,
    }
}

/// Parse the `items` array of a raw order JSON into typed lines. Malformed
/// entries are skipped rather than failing the whole order.
pub fn items_from_value(raw: &Value) -> Vec<OrderItem> {
    raw.as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|item| serde_json::from_value::<OrderItem>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Pricing breakdown as the JSON shape the frontend renders.
pub fn pricing_json(order: &Value) -> Value {
    let items = items_from_value(order.get("items").unwrap_or(&Value::Null));
    let pricing = compute_order_pricing(&items);
    let server_total = order.get("totalAmount").and_then(Value::as_f64);
    serde_json::json!({
        "subtotal": pricing.subtotal,
        "deliveryFee": pricing.delivery_fee,
        "platformFee": pricing.platform_fee,
        "tax": pricing.tax,
        "total": resolve_display_total(server_total, &pricing),
        "computedTotal": pricing.total,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: f64, unit_price: f64) -> OrderItem {
        OrderItem {
            product_id: None,
            name: None,
            quantity,
            unit_price,
            total_price: None,
        }
    }

    #[test]
    fn subtotal_under_threshold_carries_delivery_fee() {
        let pricing = compute_order_pricing(&[item(2.0, 100.0)]);
        assert_eq!(pricing.subtotal, 200.0);
        assert_eq!(pricing.delivery_fee, 40.0);
        assert_eq!(pricing.platform_fee, 10.0);
        assert_eq!(pricing.tax, 45.0);
        assert_eq!(pricing.total, 295.0);
    }

    #[test]
    fn subtotal_over_threshold_ships_free() {
        let pricing = compute_order_pricing(&[item(1.0, 350.0)]);
        assert_eq!(pricing.subtotal, 350.0);
        assert_eq!(pricing.delivery_fee, 0.0);
        assert_eq!(pricing.platform_fee, 10.0);
        assert!((pricing.tax - 64.8).abs() < 1e-9);
        assert!((pricing.total - 424.8).abs() < 1e-9);
    }

    #[test]
    fn total_always_equals_component_sum() {
        for items in [
            vec![],
            vec![item(1.0, 299.99)],
            vec![item(3.0, 100.0), item(1.0, 49.5)],
        ] {
            let p = compute_order_pricing(&items);
            let expected = p.subtotal + p.delivery_fee + p.platform_fee + p.tax;
            assert!((p.total - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_item_list_still_carries_fees() {
        let pricing = compute_order_pricing(&[]);
        assert_eq!(pricing.subtotal, 0.0);
        assert_eq!(pricing.delivery_fee, 40.0);
        assert_eq!(pricing.platform_fee, 10.0);
        assert_eq!(pricing.tax, 9.0);
        assert_eq!(pricing.total, 59.0);
    }

    #[test]
    fn explicit_line_total_wins_over_unit_price() {
        let mut line = item(2.0, 100.0);
        line.total_price = Some(150.0);
        let pricing = compute_order_pricing(&[line]);
        assert_eq!(pricing.subtotal, 150.0);
    }

    #[test]
    fn server_total_wins_for_display() {
        let pricing = compute_order_pricing(&[item(2.0, 100.0)]);
        assert_eq!(resolve_display_total(Some(290.0), &pricing), 290.0);
        assert_eq!(resolve_display_total(None, &pricing), 295.0);
        // Zero/negative server totals are treated as absent
        assert_eq!(resolve_display_total(Some(0.0), &pricing), 295.0);
    }

    #[test]
    fn pricing_json_prefers_server_total_but_reports_computed() {
        let order = serde_json::json!({
            "items": [{"quantity": 2, "unitPrice": 100.0}],
            "totalAmount": 290.0,
        });
        let json = pricing_json(&order);
        assert_eq!(json["subtotal"], 200.0);
        assert_eq!(json["total"], 290.0);
        assert_eq!(json["computedTotal"], 295.0);
    }

    #[test]
    fn malformed_items_are_skipped() {
        let raw = serde_json::json!([
            {"quantity": 1, "unitPrice": 50.0},
            "not-an-item",
        ]);
        let items = items_from_value(&raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line_total(), 50.0);
    }
}
