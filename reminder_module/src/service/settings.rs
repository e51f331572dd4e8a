//! The settings surface the conversational handlers call: read and change
//! the notification frequency and timezone. Changes land in the profile
//! store and are picked up by the scheduler on its next tick.

use chrono::{DateTime, Utc};

use crate::profile_store::{ProfileStore, ProfileStoreError};
use crate::timezone::{self, TimezoneError};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("profile store error: {0}")]
    ProfileStore(#[from] ProfileStoreError),
    #[error("{0}")]
    Timezone(#[from] TimezoneError),
    #[error("user {0} has not completed registration")]
    NotRegistered(i64),
}

pub fn settings_summary(store: &ProfileStore, user_id: i64) -> Result<String, SettingsError> {
    let profile = store
        .get_profile(user_id)?
        .ok_or(SettingsError::NotRegistered(user_id))?;
    let timezone_label = profile
        .timezone_label
        .clone()
        .unwrap_or_else(|| "UTC+0".to_string());
    Ok(format!(
        "Notification settings:\n\n\
         Frequency: {}\n\
         Timezone: {}\n\n\
         How often would you like emotion diary reminders?",
        frequency_text(profile.notification_frequency),
        timezone_label
    ))
}

pub fn set_notification_frequency(
    store: &ProfileStore,
    user_id: i64,
    frequency: i64,
) -> Result<String, SettingsError> {
    store.set_notification_frequency(user_id, frequency)?;
    Ok(if frequency == 0 {
        "Settings saved. Reminders are now off; you can turn them back on any time."
            .to_string()
    } else {
        format!(
            "Settings saved. You will now get emotion diary reminders {}.",
            frequency_text(frequency)
        )
    })
}

/// Update the timezone from the user's self-reported current local time
/// ("what time is it for you right now?").
pub fn set_timezone_from_local_time(
    store: &ProfileStore,
    user_id: i64,
    reported_time: &str,
    now: DateTime<Utc>,
) -> Result<String, SettingsError> {
    let offset = timezone::offset_from_wall_clock(reported_time, now)?;
    let label = timezone::format_offset(offset);
    store.set_timezone(user_id, offset, &label)?;
    Ok(format!(
        "Timezone updated to {label}. Reminders will now arrive in your local time."
    ))
}

pub(crate) fn frequency_text(frequency: i64) -> &'static str {
    match frequency {
        0 => "off",
        1 => "once a day",
        2 => "twice a day",
        4 => "4 times a day",
        6 => "6 times a day",
        _ => "not set",
    }
}
