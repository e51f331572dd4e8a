use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::ScheduleConfig;

use super::BoxError;

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SEND_SPACING_MS: u64 = 500;
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TRIAL_DURATION_DAYS: i64 = 14;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub telegram_bot_token: String,
    pub profiles_db_path: PathBuf,
    pub ledger_db_path: PathBuf,
    pub schedule: ScheduleConfig,
    pub tick_interval: Duration,
    pub send_spacing: Duration,
    pub delivery_timeout: Duration,
    pub trial_duration_days: i64,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, BoxError> {
        dotenvy::dotenv().ok();

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| BoxError::from("TELEGRAM_BOT_TOKEN not set"))?;

        let data_dir = PathBuf::from(
            env::var("REMINDER_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()),
        );
        let profiles_db_path = env::var("PROFILES_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("profiles.db"));
        let ledger_db_path = env::var("LEDGER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("sent_ledger.db"));

        let schedule = match env::var("SCHEDULE_CONFIG_PATH") {
            Ok(path) if !path.trim().is_empty() => ScheduleConfig::load(Path::new(path.trim()))?,
            _ => ScheduleConfig::default(),
        };

        let tick_interval = Duration::from_secs(parse_env(
            "TICK_INTERVAL_SECS",
            DEFAULT_TICK_INTERVAL_SECS,
        ));
        let send_spacing =
            Duration::from_millis(parse_env("SEND_SPACING_MS", DEFAULT_SEND_SPACING_MS));
        let delivery_timeout = Duration::from_secs(parse_env(
            "DELIVERY_TIMEOUT_SECS",
            DEFAULT_DELIVERY_TIMEOUT_SECS,
        ));
        let trial_duration_days =
            parse_env("TRIAL_DURATION_DAYS", DEFAULT_TRIAL_DURATION_DAYS);

        Ok(Self {
            telegram_bot_token,
            profiles_db_path,
            ledger_db_path,
            schedule,
            tick_interval,
            send_spacing,
            delivery_timeout,
            trial_duration_days,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
