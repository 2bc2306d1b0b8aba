use serde_json::Value;
use tauri::Emitter;

use crate::{api, db, storage};

fn value_to_settings_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse `(category, key)` from arg0: either `{category, key}` or a flat
/// `"category.key"` string.
fn parse_setting_ref(arg0: Option<&Value>) -> Result<(String, String), String> {
    match arg0 {
        Some(Value::Object(obj)) => {
            let category = obj
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or("general")
                .trim()
                .to_string();
            let key = obj
                .get("key")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or("Missing setting key")?;
            Ok((category, key))
        }
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if let Some((cat, key)) = trimmed.split_once('.') {
                Ok((cat.to_string(), key.to_string()))
            } else if !trimmed.is_empty() {
                Ok(("general".to_string(), trimmed.to_string()))
            } else {
                Err("Missing setting key".into())
            }
        }
        _ => Err("Missing setting key".into()),
    }
}

#[tauri::command]
pub async fn settings_is_configured() -> Result<bool, String> {
    Ok(storage::is_configured())
}

#[tauri::command]
pub async fn settings_get_api_url() -> Result<Value, String> {
    Ok(match storage::api_url() {
        Some(url) => Value::String(url),
        None => Value::Null,
    })
}

#[tauri::command]
pub async fn settings_update_credentials(
    arg0: Option<Value>,
    app: tauri::AppHandle,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing credentials payload")?;
    let result = storage::update_credentials(&payload)?;
    let _ = app.emit("credentials_updated", serde_json::json!({}));
    Ok(result)
}

#[tauri::command]
pub async fn settings_test_connection(arg0: Option<Value>) -> Result<Value, String> {
    let url = match arg0 {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Object(ref obj)) => obj
            .get("apiUrl")
            .or_else(|| obj.get("url"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .or_else(storage::api_url)
            .ok_or("No API URL to test")?,
        _ => storage::api_url().ok_or("No API URL to test")?,
    };
    let result = api::test_connectivity(&url).await;
    serde_json::to_value(result).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn settings_get_local(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let (category, key) = parse_setting_ref(arg0.as_ref())?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(match db::get_setting(&conn, &category, &key) {
        Some(v) => Value::String(v),
        None => Value::Null,
    })
}

#[tauri::command]
pub async fn settings_set_local(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let (category, key) = parse_setting_ref(arg0.as_ref())?;
    let value = arg1
        .or_else(|| {
            arg0.as_ref()
                .and_then(|v| v.get("value"))
                .cloned()
        })
        .ok_or("Missing setting value")?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, &category, &key, &value_to_settings_string(&value))?;
    Ok(serde_json::json!({ "success": true }))
}

/// Delete credentials and wipe the local cache, then send the frontend back
/// to onboarding.
#[tauri::command]
pub async fn settings_factory_reset(
    db: tauri::State<'_, db::DbState>,
    app: tauri::AppHandle,
) -> Result<Value, String> {
    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        db::clear_operational_data(&conn)?;
    }
    let result = storage::factory_reset()?;
    let _ = app.emit("app_reset", serde_json::json!({ "reason": "factory_reset" }));
    Ok(result)
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn setting_ref_accepts_object_and_flat_string() {
        let (cat, key) =
            parse_setting_ref(Some(&serde_json::json!({"category": "ui", "key": "theme"})))
                .unwrap();
        assert_eq!((cat.as_str(), key.as_str()), ("ui", "theme"));

        let (cat, key) = parse_setting_ref(Some(&serde_json::json!("ui.theme"))).unwrap();
        assert_eq!((cat.as_str(), key.as_str()), ("ui", "theme"));

        let (cat, key) = parse_setting_ref(Some(&serde_json::json!("theme"))).unwrap();
        assert_eq!((cat.as_str(), key.as_str()), ("general", "theme"));

        assert!(parse_setting_ref(None).is_err());
        assert!(parse_setting_ref(Some(&serde_json::json!({"category": "ui"}))).is_err());
    }

    #[test]
    fn settings_values_serialize_to_strings() {
        assert_eq!(value_to_settings_string(&serde_json::json!("x")), "x");
        assert_eq!(value_to_settings_string(&serde_json::json!(true)), "true");
        assert_eq!(value_to_settings_string(&Value::Null), "");
    }
}
