//! SQLite-backed store for user schedule profiles.
//!
//! The store is the single source of truth shared by the conversational
//! handlers and the background scheduler; both sides go through the narrow
//! operations here instead of aliasing user objects in memory.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Hours between a therapy session and its reflection prompt.
const REFLECTION_DELAY_HOURS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementState {
    Premium,
    TrialActive { ends_at: DateTime<Utc> },
    TrialExpired,
    NoTrial,
}

impl EntitlementState {
    /// Whole days left on an active trial; `None` for every other state.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            EntitlementState::TrialActive { ends_at } if *ends_at > now => {
                Some((*ends_at - now).num_days())
            }
            EntitlementState::TrialActive { .. } => Some(0),
            _ => None,
        }
    }
}

/// The slice of a user record the scheduler needs.
#[derive(Debug, Clone)]
pub struct UserScheduleProfile {
    pub user_id: i64,
    pub display_name: Option<String>,
    pub utc_offset_hours: Option<i64>,
    pub timezone_label: Option<String>,
    pub notification_frequency: i64,
    pub entitlement: EntitlementState,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl UserScheduleProfile {
    pub fn display_name_or_default(&self) -> &str {
        self.display_name.as_deref().unwrap_or("there")
    }
}

#[derive(Debug, Clone)]
pub struct PendingReflection {
    pub session_id: i64,
    pub user_id: i64,
    pub session_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("unknown user: {0}")]
    UnknownUser(i64),
    #[error("invalid notification frequency: {0}")]
    InvalidFrequency(i64),
}

const PROFILE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    user_id INTEGER PRIMARY KEY,
    display_name TEXT,
    utc_offset_hours INTEGER,
    timezone_label TEXT,
    notification_frequency INTEGER NOT NULL DEFAULT 1,
    is_premium INTEGER NOT NULL DEFAULT 0,
    trial_started_at TEXT,
    trial_ends_at TEXT,
    trial_expired INTEGER NOT NULL DEFAULT 0,
    registration_complete INTEGER NOT NULL DEFAULT 0,
    last_activity_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS therapy_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES profiles(user_id),
    session_at TEXT NOT NULL,
    reflection_due_at TEXT NOT NULL,
    reflection_sent INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_therapy_sessions_due
    ON therapy_sessions (reflection_sent, reflection_due_at);
"#;

#[derive(Debug)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ProfileStoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, ProfileStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(PROFILE_SCHEMA)?;
        ensure_profile_columns(&conn)?;
        Ok(conn)
    }

    /// Create a bare profile row if none exists yet (registration start).
    pub fn upsert_profile(
        &self,
        user_id: i64,
        display_name: Option<&str>,
    ) -> Result<(), ProfileStoreError> {
        let conn = self.open()?;
        let now = format_datetime(Utc::now());
        conn.execute(
            "INSERT INTO profiles (user_id, display_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = COALESCE(excluded.display_name, display_name),
                 updated_at = excluded.updated_at",
            params![user_id, display_name, now],
        )?;
        Ok(())
    }

    /// Finish registration: fix the display name, mark the profile active
    /// and start the trial clock.
    pub fn complete_registration(
        &self,
        user_id: i64,
        display_name: &str,
        trial_duration: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<(), ProfileStoreError> {
        self.upsert_profile(user_id, Some(display_name))?;
        let conn = self.open()?;
        let ends_at = now + trial_duration;
        conn.execute(
            "UPDATE profiles SET
                 display_name = ?2,
                 registration_complete = 1,
                 is_premium = 0,
                 trial_expired = 0,
                 trial_started_at = ?3,
                 trial_ends_at = ?4,
                 updated_at = ?5
             WHERE user_id = ?1",
            params![
                user_id,
                display_name,
                format_datetime(now),
                format_datetime(ends_at),
                format_datetime(Utc::now())
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(
        &self,
        user_id: i64,
    ) -> Result<Option<UserScheduleProfile>, ProfileStoreError> {
        let conn = self.open()?;
        conn.query_row(
            &format!("{PROFILE_COLUMNS} WHERE user_id = ?1"),
            params![user_id],
            profile_from_row,
        )
        .optional()?
        .transpose()
    }

    /// Every profile the scheduler should consider. Entitlement gating
    /// happens per tick in the eligibility filter, not here, so the one-shot
    /// expiry transition always gets a chance to run.
    pub fn list_active_profiles(&self) -> Result<Vec<UserScheduleProfile>, ProfileStoreError> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare(&format!("{PROFILE_COLUMNS} WHERE registration_complete = 1 ORDER BY user_id"))?;
        let rows = stmt.query_map([], profile_from_row)?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row??);
        }
        Ok(profiles)
    }

    pub fn set_notification_frequency(
        &self,
        user_id: i64,
        frequency: i64,
    ) -> Result<(), ProfileStoreError> {
        if !matches!(frequency, 0 | 1 | 2 | 4 | 6) {
            return Err(ProfileStoreError::InvalidFrequency(frequency));
        }
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE profiles SET notification_frequency = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, frequency, format_datetime(Utc::now())],
        )?;
        if updated == 0 {
            return Err(ProfileStoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    pub fn set_timezone(
        &self,
        user_id: i64,
        utc_offset_hours: i64,
        label: &str,
    ) -> Result<(), ProfileStoreError> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE profiles SET utc_offset_hours = ?2, timezone_label = ?3, updated_at = ?4
             WHERE user_id = ?1",
            params![user_id, utc_offset_hours, label, format_datetime(Utc::now())],
        )?;
        if updated == 0 {
            return Err(ProfileStoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    /// Write back a new entitlement state. Only the columns the variant
    /// implies are touched, so granting premium preserves the trial window
    /// for a later revocation.
    pub fn update_entitlement(
        &self,
        user_id: i64,
        state: EntitlementState,
    ) -> Result<(), ProfileStoreError> {
        let conn = self.open()?;
        let now = format_datetime(Utc::now());
        let updated = match state {
            EntitlementState::Premium => conn.execute(
                "UPDATE profiles SET is_premium = 1, trial_expired = 0, updated_at = ?2
                 WHERE user_id = ?1",
                params![user_id, now],
            )?,
            EntitlementState::TrialActive { ends_at } => conn.execute(
                "UPDATE profiles SET is_premium = 0, trial_expired = 0, trial_ends_at = ?2,
                     updated_at = ?3
                 WHERE user_id = ?1",
                params![user_id, format_datetime(ends_at), now],
            )?,
            EntitlementState::TrialExpired => conn.execute(
                "UPDATE profiles SET is_premium = 0, trial_expired = 1, updated_at = ?2
                 WHERE user_id = ?1",
                params![user_id, now],
            )?,
            EntitlementState::NoTrial => conn.execute(
                "UPDATE profiles SET is_premium = 0, trial_expired = 0,
                     trial_started_at = NULL, trial_ends_at = NULL, updated_at = ?2
                 WHERE user_id = ?1",
                params![user_id, now],
            )?,
        };
        if updated == 0 {
            return Err(ProfileStoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    /// The stored trial end, regardless of the current entitlement. Used to
    /// restore a trial-derived state when premium is revoked.
    pub fn trial_ends_at(
        &self,
        user_id: i64,
    ) -> Result<Option<DateTime<Utc>>, ProfileStoreError> {
        let conn = self.open()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT trial_ends_at FROM profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Err(ProfileStoreError::UnknownUser(user_id)),
            Some(value) => parse_optional_datetime(value.as_deref()),
        }
    }

    pub fn record_activity(
        &self,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), ProfileStoreError> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE profiles SET last_activity_at = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, format_datetime(at), format_datetime(Utc::now())],
        )?;
        if updated == 0 {
            return Err(ProfileStoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    /// Register a therapy session; the reflection prompt becomes due a few
    /// hours afterwards.
    pub fn add_therapy_session(
        &self,
        user_id: i64,
        session_at: DateTime<Utc>,
    ) -> Result<i64, ProfileStoreError> {
        let conn = self.open()?;
        let due_at = session_at + chrono::Duration::hours(REFLECTION_DELAY_HOURS);
        conn.execute(
            "INSERT INTO therapy_sessions (user_id, session_at, reflection_due_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                format_datetime(session_at),
                format_datetime(due_at),
                format_datetime(Utc::now())
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn pending_reflections(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingReflection>, ProfileStoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.user_id, s.session_at
             FROM therapy_sessions s
             JOIN profiles p ON p.user_id = s.user_id
             WHERE s.reflection_sent = 0
               AND s.reflection_due_at <= ?1
               AND p.registration_complete = 1
             ORDER BY s.reflection_due_at",
        )?;
        let rows = stmt.query_map(params![format_datetime(now)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut pending = Vec::new();
        for row in rows {
            let (session_id, user_id, session_at) = row?;
            pending.push(PendingReflection {
                session_id,
                user_id,
                session_at: parse_datetime(&session_at)?,
            });
        }
        Ok(pending)
    }

    pub fn mark_reflection_sent(&self, session_id: i64) -> Result<(), ProfileStoreError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE therapy_sessions SET reflection_sent = 1 WHERE id = ?1",
            params![session_id],
        )?;
        Ok(())
    }
}

const PROFILE_COLUMNS: &str = "SELECT user_id, display_name, utc_offset_hours, timezone_label,
    notification_frequency, is_premium, trial_ends_at, trial_expired, last_activity_at
 FROM profiles";

type RowResult = Result<UserScheduleProfile, ProfileStoreError>;

struct ProfileRow {
    user_id: i64,
    display_name: Option<String>,
    utc_offset_hours: Option<i64>,
    timezone_label: Option<String>,
    notification_frequency: i64,
    is_premium: i64,
    trial_ends_at: Option<String>,
    trial_expired: i64,
    last_activity_at: Option<String>,
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowResult> {
    let raw = ProfileRow {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        utc_offset_hours: row.get(2)?,
        timezone_label: row.get(3)?,
        notification_frequency: row.get(4)?,
        is_premium: row.get(5)?,
        trial_ends_at: row.get(6)?,
        trial_expired: row.get(7)?,
        last_activity_at: row.get(8)?,
    };
    Ok(raw.into_profile())
}

impl ProfileRow {
    fn into_profile(self) -> RowResult {
        let trial_ends_at = parse_optional_datetime(self.trial_ends_at.as_deref())?;
        let last_activity_at = parse_optional_datetime(self.last_activity_at.as_deref())?;

        let entitlement = if self.is_premium != 0 {
            EntitlementState::Premium
        } else if self.trial_expired != 0 {
            EntitlementState::TrialExpired
        } else if let Some(ends_at) = trial_ends_at {
            EntitlementState::TrialActive { ends_at }
        } else {
            EntitlementState::NoTrial
        };

        Ok(UserScheduleProfile {
            user_id: self.user_id,
            display_name: self.display_name,
            utc_offset_hours: self.utc_offset_hours,
            timezone_label: self.timezone_label,
            notification_frequency: self.notification_frequency,
            entitlement,
            last_activity_at,
        })
    }
}

fn ensure_profile_columns(conn: &Connection) -> Result<(), ProfileStoreError> {
    let mut stmt = conn.prepare("PRAGMA table_info(profiles)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = std::collections::HashSet::new();
    for row in rows {
        columns.insert(row?);
    }

    if !columns.contains("timezone_label") {
        conn.execute("ALTER TABLE profiles ADD COLUMN timezone_label TEXT", [])?;
    }
    if !columns.contains("last_activity_at") {
        conn.execute("ALTER TABLE profiles ADD COLUMN last_activity_at TEXT", [])?;
    }
    Ok(())
}

pub(crate) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn parse_optional_datetime(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ProfileStoreError> {
    match value {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn store(temp: &TempDir) -> ProfileStore {
        ProfileStore::new(temp.path().join("profiles.db")).expect("open store")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn registration_starts_trial() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), now())
            .expect("register");

        let profile = store.get_profile(100).expect("get").expect("exists");
        assert_eq!(profile.display_name.as_deref(), Some("Alex"));
        match profile.entitlement {
            EntitlementState::TrialActive { ends_at } => {
                assert_eq!(ends_at, now() + chrono::Duration::days(14));
            }
            other => panic!("expected active trial, got {other:?}"),
        }
        assert_eq!(store.list_active_profiles().expect("list").len(), 1);
    }

    #[test]
    fn frequency_validation() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), now())
            .expect("register");

        assert!(matches!(
            store.set_notification_frequency(100, 3),
            Err(ProfileStoreError::InvalidFrequency(3))
        ));
        store.set_notification_frequency(100, 4).expect("set");
        let profile = store.get_profile(100).expect("get").expect("exists");
        assert_eq!(profile.notification_frequency, 4);

        assert!(matches!(
            store.set_notification_frequency(999, 1),
            Err(ProfileStoreError::UnknownUser(999))
        ));
    }

    #[test]
    fn entitlement_roundtrip_preserves_trial_window() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), now())
            .expect("register");

        store
            .update_entitlement(100, EntitlementState::Premium)
            .expect("grant");
        let profile = store.get_profile(100).expect("get").expect("exists");
        assert_eq!(profile.entitlement, EntitlementState::Premium);

        // Trial window survives the premium grant.
        let ends_at = store.trial_ends_at(100).expect("window").expect("set");
        assert_eq!(ends_at, now() + chrono::Duration::days(14));
    }

    #[test]
    fn therapy_session_reflection_flow() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), now())
            .expect("register");

        let session_at = now() - chrono::Duration::hours(6);
        let session_id = store
            .add_therapy_session(100, session_at)
            .expect("add session");

        let pending = store.pending_reflections(now()).expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].session_id, session_id);
        assert_eq!(pending[0].user_id, 100);

        store.mark_reflection_sent(session_id).expect("mark");
        assert!(store.pending_reflections(now()).expect("pending").is_empty());

        // A session only 2 hours old is not due yet.
        store
            .add_therapy_session(100, now() - chrono::Duration::hours(2))
            .expect("add session");
        assert!(store.pending_reflections(now()).expect("pending").is_empty());
    }

    #[test]
    fn activity_tracking() {
        let temp = TempDir::new().expect("tempdir");
        let store = store(&temp);
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), now())
            .expect("register");

        store.record_activity(100, now()).expect("record");
        let profile = store.get_profile(100).expect("get").expect("exists");
        assert_eq!(profile.last_activity_at, Some(now()));
    }
}
