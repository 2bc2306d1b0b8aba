//! Local SQLite cache for CuraCart Courier.
//!
//! Uses rusqlite with WAL mode. The database holds the order cache (the
//! repository layer in `orders.rs` is its only reader/writer), the local
//! earnings ledger, and a category/key/value settings table. Schema
//! migrations are versioned and applied on startup.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Tauri managed state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Initialize the database at `{app_data_dir}/courier.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once — everything in this database can be
/// refetched from the platform.
pub fn init(app_data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(app_data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = app_data_dir.join("courier.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let wal = db_path.with_extension("db-wal");
                let shm = db_path.with_extension("db-shm");
                let _ = fs::remove_file(&wal);
                let _ = fs::remove_file(&shm);
            }
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after retry: {e}"))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(path).map_err(|e| format!("sqlite open: {e}"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| format!("pragma setup: {e}"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    if current < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Migration v1: settings and the order cache.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        -- order cache (bucket: 'assigned' | 'history')
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            items TEXT NOT NULL DEFAULT '[]',
            total_amount REAL,
            delivery_address TEXT,
            recipient_name TEXT,
            recipient_phone TEXT,
            bucket TEXT NOT NULL DEFAULT 'assigned',
            raw TEXT NOT NULL DEFAULT '{}',
            fetched_at TEXT DEFAULT (datetime('now')),
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- Indexes
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_orders_bucket ON orders(bucket);
        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key
            ON local_settings(setting_category, setting_key);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1 (settings + order cache)");
    Ok(())
}

/// Migration v2: local earnings ledger.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS earnings (
            id TEXT PRIMARY KEY,
            executive_id TEXT NOT NULL,
            order_id TEXT NOT NULL,
            delivery_fee REAL NOT NULL DEFAULT 0,
            total_earning REAL NOT NULL DEFAULT 0,
            order_details TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_earnings_order_id
            ON earnings(order_id);
        CREATE INDEX IF NOT EXISTS idx_earnings_created_at
            ON earnings(created_at);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (earnings ledger)");
    Ok(())
}

/// Migration v3: prescription fields on cached orders.
fn migrate_v3(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        ALTER TABLE orders ADD COLUMN prescription_url TEXT;
        ALTER TABLE orders ADD COLUMN prescription_verified INTEGER DEFAULT 0;

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        format!("migration v3: {e}")
    })?;

    info!("Applied migration v3 (prescription fields)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// Wipe everything refetchable: order cache, earnings, and local settings.
/// Used by factory reset alongside credential deletion.
pub fn clear_operational_data(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "DELETE FROM orders;
         DELETE FROM earnings;
         DELETE FROM local_settings;",
    )
    .map_err(|e| format!("clear_operational_data: {e}"))?;
    info!("Cleared operational data");
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    /// Open an in-memory database and apply pragmas (mirrors open_and_configure).
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get::<_, String>(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn migrations_create_all_tables() {
        let conn = test_db();
        run_migrations_for_test(&conn);
        let tables = table_names(&conn);
        for expected in ["local_settings", "orders", "earnings", "schema_version"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations_for_test(&conn);
        run_migrations_for_test(&conn);
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let conn = test_db();
        run_migrations_for_test(&conn);

        assert_eq!(get_setting(&conn, "terminal", "api_url"), None);
        set_setting(&conn, "terminal", "api_url", "https://api.curacart.health").unwrap();
        assert_eq!(
            get_setting(&conn, "terminal", "api_url").as_deref(),
            Some("https://api.curacart.health")
        );

        set_setting(&conn, "terminal", "api_url", "https://staging.curacart.health").unwrap();
        assert_eq!(
            get_setting(&conn, "terminal", "api_url").as_deref(),
            Some("https://staging.curacart.health")
        );
    }

    #[test]
    fn orders_table_carries_prescription_fields_after_v3() {
        let conn = test_db();
        run_migrations_for_test(&conn);
        conn.execute(
            "INSERT INTO orders (id, status, items, prescription_url, prescription_verified)
             VALUES ('ord-1', 'ASSIGNED', '[]', 'https://cdn/rx.pdf', 1)",
            [],
        )
        .expect("insert with prescription fields");
        let verified: i64 = conn
            .query_row(
                "SELECT prescription_verified FROM orders WHERE id = 'ord-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(verified, 1);
    }

    #[test]
    fn clear_operational_data_empties_tables() {
        let conn = test_db();
        run_migrations_for_test(&conn);
        conn.execute("INSERT INTO orders (id, status) VALUES ('o1', 'PENDING')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO earnings (id, executive_id, order_id) VALUES ('e1', 'x1', 'o1')",
            [],
        )
        .unwrap();
        set_setting(&conn, "local", "k", "v").unwrap();

        clear_operational_data(&conn).unwrap();

        let orders: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))
            .unwrap();
        let earnings: i64 = conn
            .query_row("SELECT COUNT(*) FROM earnings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(orders, 0);
        assert_eq!(earnings, 0);
        assert_eq!(get_setting(&conn, "local", "k"), None);
    }
}
