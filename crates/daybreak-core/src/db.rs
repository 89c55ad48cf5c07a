//! SQLite handle shared by the config store, the run recorder and the
//! holdings book.
//!
//! The handle is constructed once at startup and injected where needed.
//! Every unit of work borrows the connection through [`Database::with_conn`],
//! which holds the lock only for the duration of the closure.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::error::{DaybreakError, Result};
use crate::traits::ConfigStore;

/// Cloneable handle to the Daybreak database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| DaybreakError::Database(format!("DB open: {e}")))?;
        // The CLI reads run history while the daemon writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::from_connection(conn)
    }

    /// Private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DaybreakError::Database(format!("DB open: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Borrow the connection for one unit of work.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DaybreakError::Database(format!("Lock: {e}")))?;
        f(&conn).map_err(DaybreakError::from)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
            -- Runtime key/value settings
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Audit trail: one row per briefing invocation
            CREATE TABLE IF NOT EXISTS run_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                status TEXT NOT NULL,            -- 'SUCCESS', 'ERROR'
                content_summary TEXT NOT NULL DEFAULT '',
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_run_records_timestamp ON run_records(timestamp);

            -- Holdings book
            CREATE TABLE IF NOT EXISTS holdings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                name TEXT NOT NULL,
                buy_price REAL NOT NULL,
                quantity INTEGER NOT NULL,
                bought_at TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS idx_holdings_active ON holdings(ticker, active);

            -- Ledger: one row per change to the holdings book
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                holding_id INTEGER REFERENCES holdings(id) ON DELETE SET NULL,
                kind TEXT NOT NULL,              -- 'BUY', 'SELL'
                ticker TEXT NOT NULL,
                price REAL,
                quantity INTEGER,
                at TEXT NOT NULL,
                note TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_ticker ON transactions(ticker, at);
         ",
            )
        })
        .map_err(|e| DaybreakError::Database(format!("Migration: {e}")))
    }

    /// Every stored setting, sorted by key.
    pub fn config_entries(&self) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM config ORDER BY key")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }
}

impl ConfigStore for Database {
    fn get(&self, key: &str) -> Option<String> {
        let value = self.with_conn(|conn| {
            conn.query_row("SELECT value FROM config WHERE key = ?1", [key], |row| row.get(0))
                .optional()
        });
        match value {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("⚠️ Config lookup '{}' failed: {e}", key);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, Utc::now().to_rfc3339()],
            )
        })?;
        tracing::debug!("💾 Config '{}' = '{}'", key, value);
        Ok(())
    }
}
