//! SQLite database - schema definitions and connection management
//!
//! This file contains:
//! - Database struct definition
//! - Connection management (new, init)
//! - Schema creation
//!
//! All table operations are in the tables/ subdirectory.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::Mutex;

/// Main database wrapper with connection pooling via Mutex
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Create a new database connection and initialize schema
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize all database tables
    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Chat threads
        conn.execute(
            "CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        // Thread items: messages, widgets and hidden context, in insertion order
        conn.execute(
            "CREATE TABLE IF NOT EXISTS thread_items (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                thread_id TEXT NOT NULL,
                item_type TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_thread_items_thread ON thread_items(thread_id, seq)",
            [],
        )?;

        // Workflow state (active agent + booking state) per thread
        conn.execute(
            "CREATE TABLE IF NOT EXISTS workflow_contexts (
                thread_id TEXT PRIMARY KEY,
                active_agent TEXT NOT NULL DEFAULT 'orchestrator',
                agent_iterations INTEGER NOT NULL DEFAULT 0,
                total_iterations INTEGER NOT NULL DEFAULT 0,
                booking_json TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Tool execution audit log
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tool_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                agent TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                parameters TEXT NOT NULL,
                success INTEGER NOT NULL,
                result TEXT,
                duration_ms INTEGER,
                executed_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tool_executions_thread ON tool_executions(thread_id, executed_at)",
            [],
        )?;

        // x402 payments made for reservations
        conn.execute(
            "CREATE TABLE IF NOT EXISTS x402_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT,
                resource TEXT,
                amount TEXT NOT NULL,
                amount_formatted TEXT,
                asset TEXT NOT NULL,
                network TEXT NOT NULL,
                pay_to TEXT NOT NULL,
                from_address TEXT,
                tx_hash TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_x402_payments_thread ON x402_payments(thread_id)",
            [],
        )?;

        Ok(())
    }
}

/// Parse a stored RFC 3339 timestamp
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("[DB] Bad timestamp '{}': {}", value, e);
            Utc::now()
        })
}
