//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! The engine calls store methods; it never executes SQL directly.
//!
//! Decimal values are stored as TEXT and parsed back exactly; REAL
//! columns would let cents drift across recompute cycles.

use crate::{
    error::StipendResult,
    event::{EventLogEntry, StipendEvent},
    types::StipendId,
};
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

mod calendar;
mod stipend;
mod student;

pub struct KollelStore {
    conn: Connection,
}

impl KollelStore {
    pub fn open(path: &str) -> StipendResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> StipendResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> StipendResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_kollel.sql"))?;
        Ok(())
    }

    /// Run `f` inside one SQLite transaction. Any error rolls back every
    /// write `f` made through this store.
    ///
    /// Called while a transaction is already open, `f` joins it: the
    /// outermost caller decides whether everything commits.
    pub fn in_transaction<T>(&self, f: impl FnOnce() -> StipendResult<T>) -> StipendResult<T> {
        if !self.conn.is_autocommit() {
            return f();
        }
        let tx = self.conn.unchecked_transaction()?;
        let out = f()?;
        tx.commit()?;
        Ok(out)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(
        &self,
        stipend_id: Option<StipendId>,
        batch_id:   Option<&str>,
        event:      &StipendEvent,
    ) -> StipendResult<()> {
        let payload = serde_json::to_string(event)?;
        self.conn.execute(
            "INSERT INTO stipend_event (stipend_id, batch_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![stipend_id, batch_id, event.type_name(), payload, Utc::now()],
        )?;
        Ok(())
    }

    pub fn events_for_stipend(&self, stipend_id: StipendId) -> StipendResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, stipend_id, batch_id, event_type, payload
             FROM stipend_event WHERE stipend_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![stipend_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn events_for_batch(&self, batch_id: &str) -> StipendResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, stipend_id, batch_id, event_type, payload
             FROM stipend_event WHERE batch_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![batch_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Number of audit events of one type (for tests).
    pub fn event_count(&self, event_type: &str) -> StipendResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM stipend_event WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventLogEntry> {
    Ok(EventLogEntry {
        id:         Some(row.get(0)?),
        stipend_id: row.get(1)?,
        batch_id:   row.get(2)?,
        event_type: row.get(3)?,
        payload:    row.get(4)?,
    })
}

/// Read a decimal TEXT column.
pub(crate) fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Canonical TEXT form of a decimal for storage.
pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}
