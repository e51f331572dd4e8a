//! Dedup ledger: which notifications have already gone out.
//!
//! Keys are scoped so that a daily reminder can fire once per slot per local
//! day, a weekly message once per ISO week, and a trial warning once per
//! trial period. The SQLite implementation survives restarts; the in-memory
//! one backs tests and ephemeral deployments.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    ThreeDay,
    OneDay,
}

impl WarningKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            WarningKind::ThreeDay => "three_day",
            WarningKind::OneDay => "one_day",
        }
    }

    pub(crate) fn threshold_days(self) -> i64 {
        match self {
            WarningKind::ThreeDay => 3,
            WarningKind::OneDay => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeeklyKind {
    Motivation,
    Reflection,
}

impl WeeklyKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            WeeklyKind::Motivation => "motivation",
            WeeklyKind::Reflection => "reflection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    /// A daily reminder slot; scoped by the local calendar date.
    Daily(NaiveTime),
    /// A weekly message; scoped by ISO week, not by date.
    Weekly {
        kind: WeeklyKind,
        iso_year: i32,
        iso_week: u32,
    },
    /// A trial warning; scoped by the trial period it belongs to so a
    /// re-granted trial gets a fresh warning lifecycle.
    TrialWarning {
        kind: WarningKind,
        trial_ends_on: NaiveDate,
    },
}

impl SlotKey {
    /// Stable string form used as the dedup key.
    pub fn dedup_key(&self, local_date: NaiveDate) -> String {
        match self {
            SlotKey::Daily(time) => format!(
                "daily:{}:{}",
                local_date.format("%Y-%m-%d"),
                time.format("%H:%M")
            ),
            SlotKey::Weekly {
                kind,
                iso_year,
                iso_week,
            } => format!("weekly:{}:{:04}-W{:02}", kind.label(), iso_year, iso_week),
            SlotKey::TrialWarning {
                kind,
                trial_ends_on,
            } => format!(
                "warning:{}:{}",
                kind.label(),
                trial_ends_on.format("%Y-%m-%d")
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger lock poisoned")]
    LockPoisoned,
}

/// Bookkeeping behind at-most-once delivery. Recording the same triple
/// twice is a no-op, and recording for different users never interferes.
pub trait SentLedger: Send + Sync {
    fn already_sent(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        key: &SlotKey,
    ) -> Result<bool, LedgerError>;

    fn record_sent(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        key: &SlotKey,
    ) -> Result<(), LedgerError>;

    /// Drop entries recorded on a local date before `cutoff`. Safe to call
    /// at any time: every key is scoped, so stale rows can never block a
    /// future send.
    fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, LedgerError>;
}

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sent_notifications (
    user_id INTEGER NOT NULL,
    dedup_key TEXT NOT NULL,
    sent_date TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (user_id, dedup_key)
);

CREATE INDEX IF NOT EXISTS idx_sent_notifications_sent_date
    ON sent_notifications (sent_date);
"#;

#[derive(Debug)]
pub struct SqliteLedger {
    path: PathBuf,
}

impl SqliteLedger {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let ledger = Self { path: path.into() };
        let _ = ledger.open()?;
        Ok(ledger)
    }

    fn open(&self) -> Result<Connection, LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(conn)
    }
}

impl SentLedger for SqliteLedger {
    fn already_sent(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        key: &SlotKey,
    ) -> Result<bool, LedgerError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sent_notifications WHERE user_id = ?1 AND dedup_key = ?2",
            params![user_id, key.dedup_key(local_date)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn record_sent(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        key: &SlotKey,
    ) -> Result<(), LedgerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO sent_notifications (user_id, dedup_key, sent_date, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                key.dedup_key(local_date),
                local_date.format("%Y-%m-%d").to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, LedgerError> {
        let conn = self.open()?;
        let removed = conn.execute(
            "DELETE FROM sent_notifications WHERE sent_date < ?1",
            params![cutoff.format("%Y-%m-%d").to_string()],
        )?;
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<(i64, String), NaiveDate>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SentLedger for MemoryLedger {
    fn already_sent(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        key: &SlotKey,
    ) -> Result<bool, LedgerError> {
        let entries = self.entries.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(entries.contains_key(&(user_id, key.dedup_key(local_date))))
    }

    fn record_sent(
        &self,
        user_id: i64,
        local_date: NaiveDate,
        key: &SlotKey,
    ) -> Result<(), LedgerError> {
        let mut entries = self.entries.lock().map_err(|_| LedgerError::LockPoisoned)?;
        entries
            .entry((user_id, key.dedup_key(local_date)))
            .or_insert(local_date);
        Ok(())
    }

    fn prune_older_than(&self, cutoff: NaiveDate) -> Result<usize, LedgerError> {
        let mut entries = self.entries.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let before = entries.len();
        entries.retain(|_, sent_date| *sent_date >= cutoff);
        Ok(before - entries.len())
    }
}
