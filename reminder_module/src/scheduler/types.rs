use crate::profile_store::ProfileStoreError;

use super::ledger::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    EmotionReminder,
    WeeklyMotivation,
    WeeklyReflection,
    TrialWarning,
    SessionReflection,
}

impl NotificationCategory {
    pub(crate) fn label(self) -> &'static str {
        match self {
            NotificationCategory::EmotionReminder => "emotion reminder",
            NotificationCategory::WeeklyMotivation => "weekly motivation",
            NotificationCategory::WeeklyReflection => "weekly reflection",
            NotificationCategory::TrialWarning => "trial warning",
            NotificationCategory::SessionReflection => "session reflection",
        }
    }
}

/// One notification to attempt; lives for a single tick iteration.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub user_id: i64,
    pub category: NotificationCategory,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("profile store error: {0}")]
    ProfileStore(#[from] ProfileStoreError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// What one tick did, for the log line at the end of the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub users_processed: usize,
    pub reminders_sent: usize,
    pub motivations_sent: usize,
    pub reflections_sent: usize,
    pub warnings_sent: usize,
    pub session_reflections_sent: usize,
    pub delivery_failures: usize,
}

impl TickSummary {
    pub(crate) fn count_sent(&mut self, category: NotificationCategory) {
        match category {
            NotificationCategory::EmotionReminder => self.reminders_sent += 1,
            NotificationCategory::WeeklyMotivation => self.motivations_sent += 1,
            NotificationCategory::WeeklyReflection => self.reflections_sent += 1,
            NotificationCategory::TrialWarning => self.warnings_sent += 1,
            NotificationCategory::SessionReflection => self.session_reflections_sent += 1,
        }
    }

    pub fn total_sent(&self) -> usize {
        self.reminders_sent
            + self.motivations_sent
            + self.reflections_sent
            + self.warnings_sent
            + self.session_reflections_sent
    }
}
