//! IPC command handlers, grouped by domain.

pub mod auth;
pub mod delivery;
pub mod earnings;
pub mod executive;
pub mod orders;
pub mod settings;

use serde_json::Value;

/// Extract an order id from the flexible arg0 shapes the frontend sends:
/// a plain string, or an object carrying `orderId`/`order_id`/`id`.
pub(crate) fn parse_order_id(arg0: Option<Value>) -> Result<String, String> {
    let payload = arg0.ok_or("Missing order id argument")?;
    let id = match &payload {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(map) => ["orderId", "order_id", "id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_string()),
        _ => None,
    };
    id.filter(|s| !s.is_empty())
        .ok_or_else(|| "Invalid payload: expected an order id".to_string())
}

#[cfg(test)]
mod tests {
    use super::parse_order_id;

    #[test]
    fn parse_order_id_supports_string_and_object() {
        assert_eq!(
            parse_order_id(Some(serde_json::json!("ord-1"))).unwrap(),
            "ord-1"
        );
        assert_eq!(
            parse_order_id(Some(serde_json::json!({"orderId": "ord-2"}))).unwrap(),
            "ord-2"
        );
        assert_eq!(
            parse_order_id(Some(serde_json::json!({"id": " ord-3 "}))).unwrap(),
            "ord-3"
        );
        assert!(parse_order_id(None).is_err());
        assert!(parse_order_id(Some(serde_json::json!({"other": 1}))).is_err());
        assert!(parse_order_id(Some(serde_json::json!(""))).is_err());
    }
}
