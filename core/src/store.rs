//! Session journal on an in-memory SQLite database.
//!
//! RULE: Only store.rs talks to the database.
//! The journal never touches disk; it lives exactly as long as the store.

use crate::{
    error::ConsoleResult,
    event::EventLogEntry,
    types::Millis,
};
use rusqlite::{params, Connection, OptionalExtension};

pub struct ConsoleStore {
    conn: Connection,
}

impl ConsoleStore {
    pub fn in_memory() -> ConsoleResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ConsoleResult<()> {
        self.conn
            .execute_batch(include_str!("../migrations/001_session_journal.sql"))?;
        Ok(())
    }

    // ── Session ────────────────────────────────────────────────

    pub fn open_session(&self, session_id: &str, container_id: &str, at: Millis) -> ConsoleResult<()> {
        self.conn.execute(
            "INSERT INTO session (session_id, container_id, mounted_at) VALUES (?1, ?2, ?3)",
            params![session_id, container_id, at as i64],
        )?;
        Ok(())
    }

    pub fn close_session(&self, session_id: &str, at: Millis) -> ConsoleResult<()> {
        self.conn.execute(
            "UPDATE session SET unmounted_at = ?2 WHERE session_id = ?1 AND unmounted_at IS NULL",
            params![session_id, at as i64],
        )?;
        Ok(())
    }

    /// Unmount time for a session; `None` while it is still open.
    pub fn session_closed_at(&self, session_id: &str) -> ConsoleResult<Option<Millis>> {
        let closed = self
            .conn
            .query_row(
                "SELECT unmounted_at FROM session WHERE session_id = ?1",
                params![session_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(closed.map(|at| at as Millis))
    }

    /// Drop closed sessions and their entries, keeping the `keep` most
    /// recently closed. Returns how many entries went.
    pub fn prune_closed_sessions(&self, keep: usize) -> ConsoleResult<usize> {
        let expired = "SELECT session_id FROM session WHERE unmounted_at IS NOT NULL
                       ORDER BY unmounted_at DESC, rowid DESC LIMIT -1 OFFSET ?1";
        let removed = self.conn.execute(
            &format!("DELETE FROM event_log WHERE session_id IN ({expired})"),
            params![keep as i64],
        )?;
        self.conn.execute(
            &format!("DELETE FROM session WHERE session_id IN ({expired})"),
            params![keep as i64],
        )?;
        Ok(removed)
    }

    pub fn session_count(&self) -> ConsoleResult<i64> {
        let n = self.conn.query_row("SELECT COUNT(*) FROM session", [], |row| row.get(0))?;
        Ok(n)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> ConsoleResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (session_id, at_ms, component, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.session_id,
                entry.at as i64,
                entry.component,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    /// Keep only the newest `keep` entries of a session. Returns how many
    /// were removed.
    pub fn prune_session(&self, session_id: &str, keep: usize) -> ConsoleResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM event_log WHERE session_id = ?1 AND id <= (
                 SELECT id FROM event_log WHERE session_id = ?1
                 ORDER BY id DESC LIMIT 1 OFFSET ?2
             )",
            params![session_id, keep as i64],
        )?;
        Ok(removed)
    }

    pub fn events_for_session(&self, session_id: &str) -> ConsoleResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, at_ms, component, event_type, payload
             FROM event_log WHERE session_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![session_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    session_id: row.get(1)?,
                    at:         row.get::<_, i64>(2)? as Millis,
                    component:  row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, session_id: &str, event_type: &str) -> ConsoleResult<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE session_id = ?1 AND event_type = ?2",
            params![session_id, event_type],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn total_events(&self) -> ConsoleResult<i64> {
        let n = self.conn.query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(n)
    }
}
