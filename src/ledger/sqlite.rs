//! SQLite-backed ledger store (WAL mode).
//!
//! - ids come from `INTEGER PRIMARY KEY AUTOINCREMENT`, so they are strictly
//!   increasing and never reused, even after a wipe
//! - `created_at` is fixed-width RFC 3339 (microseconds, `Z`), so ordering the
//!   text column is ordering by time
//! - the numeric columns are declared without a type: legacy rows may hold a
//!   JSON array as TEXT there, and SQLite keeps whatever was written

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, OpenFlags, Row};
use serde_json::Value;

use crate::errors::{EcoError, Result};
use crate::ledger::store::{stamp, ActionStore, Clock, NewRecord, RepairedFields, RowScan, StoredAction};
use crate::prediction::NumericField;
use crate::taxonomy::Category;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS eco_actions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT NOT NULL,
    category    TEXT NOT NULL,
    confidence,
    eco_score,
    points,
    source_tag  TEXT NOT NULL DEFAULT 'api',
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_eco_actions_user_time
    ON eco_actions (user_id, created_at DESC, id DESC);
";

const SELECT_COLUMNS: &str =
    "id, user_id, category, confidence, eco_score, points, source_tag, created_at";

/// `rusqlite::Connection` is `Send` but not `Sync`; the mutex makes the store
/// shareable and serializes writers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EcoError::storage("create ledger directory", e))?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;
        conn.execute_batch(SCHEMA_SQL)?;
        tracing::info!(target: "ledger", path = %path.display(), "sqlite ledger opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database; used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run raw SQL against the ledger. Used to stage legacy rows in tests and
    /// migrations; the request path never calls it.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        self.lock("execute_raw")?.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self, context: &'static str) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EcoError::storage(context, "sqlite connection mutex poisoned"))
    }

    fn query_rows(&self, context: &'static str, sql: &str, user: Option<&str>) -> Result<RowScan> {
        let conn = self.lock(context)?;
        let mut stmt = conn.prepare_cached(sql)?;
        let decoded = match user {
            Some(u) => stmt.query_map(params![u], decode_row)?,
            None => stmt.query_map([], decode_row)?,
        };
        let mut scan = RowScan::default();
        for row in decoded {
            match row? {
                Decoded::Row(action) => scan.rows.push(action),
                Decoded::Bad { id, reason } => {
                    tracing::warn!(target: "ledger", context, id, %reason, "undecodable ledger row skipped");
                    scan.skipped += 1;
                }
            }
        }
        Ok(scan)
    }
}

enum Decoded {
    Row(StoredAction),
    Bad { id: i64, reason: String },
}

/// Decode one row; a value that does not convert marks the row bad instead of
/// failing the whole query.
fn decode_row(row: &Row<'_>) -> rusqlite::Result<Decoded> {
    let id: i64 = row.get(0)?;
    match row_to_action(row) {
        Ok(action) => Ok(Decoded::Row(action)),
        Err(
            e @ (rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)),
        ) => Ok(Decoded::Bad { id, reason: e.to_string() }),
        Err(e) => Err(e),
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(target: "ledger", %mode, "requested WAL journal mode but got another");
    }
    Ok(())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_action(row: &Row<'_>) -> rusqlite::Result<StoredAction> {
    let category_raw: String = row.get(2)?;
    let category = category_raw
        .parse::<Category>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let created_raw: String = row.get(7)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    Ok(StoredAction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category,
        confidence: numeric_column(row.get_ref(3)?),
        eco_score: numeric_column(row.get_ref(4)?),
        points: numeric_column(row.get_ref(5)?),
        source_tag: row.get(6)?,
        created_at,
    })
}

/// Read a numeric column without trusting its storage class.
/// NULL reads as an empty structure so the repair rule gives it the default.
fn numeric_column(v: ValueRef<'_>) -> NumericField {
    match v {
        ValueRef::Integer(i) => NumericField::Scalar(i as f64),
        ValueRef::Real(f) => NumericField::Scalar(f),
        ValueRef::Null => NumericField::Many(Vec::new()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Array(items)) => NumericField::Many(items),
                _ => NumericField::Text(text),
            }
        }
    }
}

impl ActionStore for SqliteStore {
    fn insert(&self, record: NewRecord, clock: &Clock) -> Result<i64> {
        let conn = self.lock("insert")?;
        let created_at = stamp(clock);
        conn.prepare_cached(
            "INSERT INTO eco_actions (
                user_id, category, confidence, eco_score, points, source_tag, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
        )?
        .execute(params![
            record.user_id,
            record.category.as_str(),
            record.confidence,
            record.eco_score,
            record.points,
            record.source_tag,
            format_timestamp(&created_at),
        ])?;
        Ok(conn.last_insert_rowid())
    }

    fn select_by_user(&self, user_id: &str) -> Result<Vec<StoredAction>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM eco_actions
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC"
        );
        Ok(self.query_rows("select_by_user", &sql, Some(user_id))?.rows)
    }

    fn scan_all(&self) -> Result<RowScan> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM eco_actions ORDER BY id ASC");
        self.query_rows("scan_all", &sql, None)
    }

    fn rewrite_numeric(&self, id: i64, fields: RepairedFields) -> Result<()> {
        let conn = self.lock("rewrite_numeric")?;
        let changed = conn
            .prepare_cached(
                "UPDATE eco_actions SET confidence = ?1, eco_score = ?2, points = ?3 WHERE id = ?4",
            )?
            .execute(params![fields.confidence, fields.eco_score, fields.points, id])?;
        if changed == 0 {
            return Err(EcoError::invalid("id", format!("no row with id {id}")));
        }
        Ok(())
    }

    fn wipe(&self) -> Result<usize> {
        let conn = self.lock("wipe")?;
        Ok(conn.execute("DELETE FROM eco_actions", [])?)
    }

    fn ping(&self) -> bool {
        self.lock("ping")
            .map(|c| c.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).is_ok())
            .unwrap_or(false)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
