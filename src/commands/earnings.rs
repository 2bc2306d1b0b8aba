use chrono::NaiveDate;
use serde_json::Value;

use crate::{db, earnings};

#[tauri::command]
pub async fn earnings_get_today(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    earnings::earnings_today(&conn)
}

/// Summary for one calendar day. arg0 is a `YYYY-MM-DD` string or
/// `{"date": "YYYY-MM-DD"}`.
#[tauri::command]
pub async fn earnings_get_for_day(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let raw = match arg0 {
        Some(Value::String(s)) => s,
        Some(Value::Object(ref obj)) => obj
            .get("date")
            .or_else(|| obj.get("day"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or("Missing date")?,
        _ => return Err("Missing date".into()),
    };
    let day = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| format!("Invalid date {raw:?}: {e}"))?;

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    earnings::earnings_for_day(&conn, day)
}
