//! Local SQLite table for service orders.
//!
//! Uses rusqlite with WAL mode. Unlike the sheet backend, single-order saves
//! are addressed by `order_id` (`INSERT ... ON CONFLICT DO UPDATE`), so two
//! clerks editing different orders never clobber each other.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info, warn};

use super::OrderStore;
use crate::error::StoreError;
use crate::records::{parse_number, value_text, RawRecord, COLUMNS, COL_ORDER_ID, NUMERIC_COLUMNS};

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

const DB_FILE: &str = "service_orders.db";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) `{data_dir}/service_orders.db` and run migrations.
    ///
    /// On open failure the file is assumed corrupt: it is moved aside and
    /// a fresh database is created once.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::Config(format!("cannot create data dir: {e}")))?;
        let db_path = data_dir.join(DB_FILE);
        info!("Opening order database at {}", db_path.display());

        let conn = match open_and_configure(&db_path) {
            Ok(c) => c,
            Err(first_err) => {
                warn!(
                    "Database open failed ({}), moving file aside and retrying once",
                    first_err
                );
                if db_path.exists() {
                    let aside = db_path.with_extension("db.corrupt");
                    let _ = fs::rename(&db_path, &aside);
                    let _ = fs::remove_file(db_path.with_extension("db-wal"));
                    let _ = fs::remove_file(db_path.with_extension("db-shm"));
                }
                open_and_configure(&db_path)?
            }
        };
        run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn open_and_configure(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }
    info!("Migrating order database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    Ok(())
}

/// Migration v1: the order table, one column per sheet column.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    let columns: Vec<String> = COLUMNS
        .iter()
        .map(|col| {
            if *col == COL_ORDER_ID {
                format!("{col} TEXT PRIMARY KEY")
            } else if NUMERIC_COLUMNS.contains(col) {
                format!("{col} REAL NOT NULL DEFAULT 0")
            } else {
                format!("{col} TEXT NOT NULL DEFAULT ''")
            }
        })
        .collect();
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS service_orders (
            {},
            updated_at TEXT DEFAULT (datetime('now'))
        );
        INSERT INTO schema_version (version) VALUES (1);",
        columns.join(",\n            ")
    );
    conn.execute_batch(&sql).map_err(|e| {
        error!("Migration v1 failed: {e}");
        StoreError::from(e)
    })
}

/// Migration v2: indexes for status boards and date filters.
fn migrate_v2(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_service_orders_status ON service_orders(status);
         CREATE INDEX IF NOT EXISTS idx_service_orders_received ON service_orders(date_received);
         INSERT INTO schema_version (version) VALUES (2);",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        StoreError::from(e)
    })
}

fn bind_values(row: &RawRecord) -> Vec<SqlValue> {
    COLUMNS
        .iter()
        .map(|col| {
            let cell = row.get(*col).unwrap_or(&Value::Null);
            if NUMERIC_COLUMNS.contains(col) {
                SqlValue::Real(parse_number(cell).unwrap_or(0.0))
            } else {
                SqlValue::Text(value_text(cell))
            }
        })
        .collect()
}

fn json_from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Value::from(f),
        SqlValue::Text(s) => Value::from(s),
        SqlValue::Blob(_) => Value::Null,
    }
}

fn insert_sql(upsert: bool) -> String {
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{i}")).collect();
    let mut sql = format!(
        "INSERT INTO service_orders ({}) VALUES ({})",
        COLUMNS.join(", "),
        placeholders.join(", ")
    );
    if upsert {
        let assignments: Vec<String> = COLUMNS
            .iter()
            .filter(|col| **col != COL_ORDER_ID)
            .map(|col| format!("{col} = excluded.{col}"))
            .collect();
        sql.push_str(&format!(
            " ON CONFLICT(order_id) DO UPDATE SET {}, updated_at = datetime('now')",
            assignments.join(", ")
        ));
    }
    sql
}

impl OrderStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn read_all(&self) -> Result<Vec<RawRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let sql = format!(
            "SELECT {} FROM service_orders ORDER BY rowid",
            COLUMNS.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let mut rec = RawRecord::new();
            for (i, col) in COLUMNS.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                rec.insert((*col).to_string(), json_from_sql(value));
            }
            Ok(rec)
        })?;
        let mut out = Vec::new();
        for rec in rows {
            out.push(rec?);
        }
        Ok(out)
    }

    fn write_all(&self, rows: &[RawRecord]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM service_orders", [])?;
        {
            let mut stmt = tx.prepare(&insert_sql(true))?;
            for row in rows {
                stmt.execute(params_from_iter(bind_values(row)))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert(&self, row: &RawRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        conn.execute(&insert_sql(true), params_from_iter(bind_values(row)))?;
        Ok(())
    }
}
