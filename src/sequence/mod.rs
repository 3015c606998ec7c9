//! Envelope control number sequencer.
//!
//! ISA, GS, and ST control numbers must be unique per counter across every
//! interchange this installation ever produced: payers reject reused
//! numbers and reconciliation against 999/277 acknowledgments keys on
//! them. Each counter is one SQLite row; `next()` is a single
//! `UPDATE ... RETURNING`, so the value is committed before the caller
//! sees it and concurrent callers can never draw the same number.

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::db::DatabaseError;

/// The three envelope levels that carry a control number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceName {
    Isa,
    Gs,
    St,
}

impl SequenceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Isa => "isa",
            Self::Gs => "gs",
            Self::St => "st",
        }
    }

    /// Digit width of the zero-padded wire rendering.
    pub fn width(&self) -> usize {
        match self {
            Self::Isa | Self::Gs => 9,
            Self::St => 4,
        }
    }

    /// Largest value the wire format can carry (all nines).
    pub fn ceiling(&self) -> u64 {
        match self {
            Self::Isa | Self::Gs => 999_999_999,
            Self::St => 9_999,
        }
    }
}

/// What to do when a counter reaches its digit-width ceiling. Payer
/// contracts rarely permit number reuse, so the default refuses to wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Fail with [`SequenceError::Exhausted`] (default).
    #[default]
    Error,
    /// Restart at 1. Only for payers whose contract permits reuse.
    Wrap,
}

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Counter {name} exhausted at ceiling {ceiling}")]
    Exhausted { name: &'static str, ceiling: u64 },

    #[error("Counter row missing: {0}")]
    MissingCounter(&'static str),
}

/// Issues control numbers from the `control_sequences` table.
pub struct ControlNumberSequencer<'c> {
    conn: &'c Connection,
    policy: OverflowPolicy,
}

impl<'c> ControlNumberSequencer<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn, policy: OverflowPolicy::default() }
    }

    pub fn with_policy(conn: &'c Connection, policy: OverflowPolicy) -> Self {
        Self { conn, policy }
    }

    /// Draw the next value for a counter. Atomic: the increment commits
    /// before the value is returned, so a crash after this call can skip
    /// numbers but never reissue one.
    pub fn next(&self, name: SequenceName) -> Result<u64, SequenceError> {
        let ceiling = name.ceiling() as i64;
        let drawn: Option<i64> = match self.policy {
            OverflowPolicy::Error => self
                .conn
                .query_row(
                    "UPDATE control_sequences SET value = value + 1
                     WHERE name = ?1 AND value < ?2
                     RETURNING value",
                    params![name.as_str(), ceiling],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?,
            OverflowPolicy::Wrap => self
                .conn
                .query_row(
                    "UPDATE control_sequences
                     SET value = CASE WHEN value >= ?2 THEN 1 ELSE value + 1 END
                     WHERE name = ?1
                     RETURNING value",
                    params![name.as_str(), ceiling],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?,
        };

        match drawn {
            Some(value) => Ok(value as u64),
            None => {
                // No row updated: either the counter row is gone or the
                // Error policy hit the ceiling. Distinguish the two.
                let exists: bool = self.conn.query_row(
                    "SELECT COUNT(*) FROM control_sequences WHERE name = ?1",
                    params![name.as_str()],
                    |row| row.get::<_, i64>(0).map(|c| c > 0),
                )?;
                if exists {
                    Err(SequenceError::Exhausted { name: name.as_str(), ceiling: name.ceiling() })
                } else {
                    Err(SequenceError::MissingCounter(name.as_str()))
                }
            }
        }
    }

    /// Current value without drawing (diagnostics only).
    pub fn current(&self, name: SequenceName) -> Result<u64, SequenceError> {
        let value: i64 = self
            .conn
            .query_row(
                "SELECT value FROM control_sequences WHERE name = ?1",
                params![name.as_str()],
                |row| row.get(0),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Err(SequenceError::MissingCounter(name.as_str()))
                }
                other => Err(other.into()),
            })?;
        Ok(value as u64)
    }
}

/// Zero-padded wire rendering: 9 digits for ISA/GS, 4 for ST.
pub fn render_control_number(name: SequenceName, value: u64) -> String {
    format!("{:0width$}", value, width = name.width())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::{open_database, open_memory_database};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn next_is_monotonic() {
        let conn = open_memory_database().unwrap();
        let seq = ControlNumberSequencer::new(&conn);
        let a = seq.next(SequenceName::Isa).unwrap();
        let b = seq.next(SequenceName::Isa).unwrap();
        let c = seq.next(SequenceName::Isa).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn counters_are_independent() {
        let conn = open_memory_database().unwrap();
        let seq = ControlNumberSequencer::new(&conn);
        assert_eq!(seq.next(SequenceName::Isa).unwrap(), 1);
        assert_eq!(seq.next(SequenceName::Gs).unwrap(), 1);
        assert_eq!(seq.next(SequenceName::St).unwrap(), 1);
        assert_eq!(seq.next(SequenceName::Isa).unwrap(), 2);
        assert_eq!(seq.next(SequenceName::St).unwrap(), 2);
    }

    #[test]
    fn concurrent_draws_are_pairwise_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequences.db");
        // Create schema up front; worker threads open their own connections.
        open_database(&path).unwrap();

        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let path = path.clone();
            let seen = Arc::clone(&seen);
            handles.push(thread::spawn(move || {
                let conn = open_database(&path).unwrap();
                let seq = ControlNumberSequencer::new(&conn);
                for _ in 0..50 {
                    let value = seq.next(SequenceName::Isa).unwrap();
                    assert!(
                        seen.lock().unwrap().insert(value),
                        "control number {value} issued twice"
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 200);
    }

    #[test]
    fn error_policy_refuses_past_ceiling() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "UPDATE control_sequences SET value = ?1 WHERE name = 'st'",
            params![SequenceName::St.ceiling() as i64 - 1],
        )
        .unwrap();

        let seq = ControlNumberSequencer::new(&conn);
        assert_eq!(seq.next(SequenceName::St).unwrap(), 9_999);
        let err = seq.next(SequenceName::St);
        assert!(matches!(err, Err(SequenceError::Exhausted { name: "st", .. })));
        // Counter stays at the ceiling; nothing was consumed.
        assert_eq!(seq.current(SequenceName::St).unwrap(), 9_999);
    }

    #[test]
    fn wrap_policy_restarts_at_one() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "UPDATE control_sequences SET value = ?1 WHERE name = 'st'",
            params![SequenceName::St.ceiling() as i64],
        )
        .unwrap();

        let seq = ControlNumberSequencer::with_policy(&conn, OverflowPolicy::Wrap);
        assert_eq!(seq.next(SequenceName::St).unwrap(), 1);
        assert_eq!(seq.next(SequenceName::St).unwrap(), 2);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequences.db");
        {
            let conn = open_database(&path).unwrap();
            let seq = ControlNumberSequencer::new(&conn);
            for _ in 0..5 {
                seq.next(SequenceName::Gs).unwrap();
            }
        }
        let conn = open_database(&path).unwrap();
        let seq = ControlNumberSequencer::new(&conn);
        assert_eq!(seq.next(SequenceName::Gs).unwrap(), 6);
    }

    #[test]
    fn rendering_is_zero_padded() {
        assert_eq!(render_control_number(SequenceName::Isa, 7), "000000007");
        assert_eq!(render_control_number(SequenceName::Gs, 123_456), "000123456");
        assert_eq!(render_control_number(SequenceName::St, 42), "0042");
    }
}
