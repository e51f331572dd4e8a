use std::env;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serial_test::serial;
use tempfile::TempDir;

use reminder_module::{
    ProfileStore, ReminderScheduler, ScheduleConfig, SqliteLedger, TelegramSink,
};

static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        let original = env::var(key).ok();
        env::set_var(key, value);
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.original {
            Some(value) => env::set_var(self.key, value),
            None => env::remove_var(self.key),
        }
    }
}

fn scheduler_against(
    temp: &TempDir,
    bot_token: &str,
) -> ReminderScheduler<TelegramSink> {
    let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
    let ledger = SqliteLedger::new(temp.path().join("ledger.db")).expect("ledger");
    let sink = TelegramSink::new(bot_token.to_string(), Duration::from_secs(2));
    ReminderScheduler::new(
        store,
        Box::new(ledger),
        sink,
        ScheduleConfig::default(),
        Duration::ZERO,
    )
}

#[test]
#[serial]
fn tick_delivers_through_telegram_api() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let mut server = mockito::Server::new();
    let _guard = EnvGuard::set("TELEGRAM_API_BASE_URL", server.url());

    let mock = server
        .mock("POST", "/bottest-token/sendMessage")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "chat_id": 100,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true,"result":{"message_id":7}}"#)
        .expect(1)
        .create();

    let temp = TempDir::new().expect("tempdir");
    let registered_at = Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap();
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), registered_at)
            .expect("register");
        store.set_notification_frequency(100, 1).expect("frequency");
        store.set_timezone(100, 0, "UTC+0").expect("timezone");
    }

    let mut scheduler = scheduler_against(&temp, "test-token");
    let tick_at = Utc.with_ymd_and_hms(2026, 8, 10, 16, 0, 0).unwrap();
    let summary = scheduler.tick(tick_at).expect("tick");

    assert_eq!(summary.reminders_sent, 1);
    assert_eq!(summary.delivery_failures, 0);
    mock.assert();
}

#[test]
#[serial]
fn api_rejection_counts_as_failure_and_consumes_slot() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let mut server = mockito::Server::new();
    let _guard = EnvGuard::set("TELEGRAM_API_BASE_URL", server.url());

    let mock = server
        .mock("POST", "/bottest-token/sendMessage")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":false,"description":"Forbidden: bot was blocked by the user"}"#)
        .expect(1)
        .create();

    let temp = TempDir::new().expect("tempdir");
    let registered_at = Utc.with_ymd_and_hms(2026, 8, 10, 9, 0, 0).unwrap();
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        store
            .complete_registration(100, "Alex", chrono::Duration::days(14), registered_at)
            .expect("register");
        store.set_notification_frequency(100, 1).expect("frequency");
        store.set_timezone(100, 0, "UTC+0").expect("timezone");
    }

    let mut scheduler = scheduler_against(&temp, "test-token");
    let tick_at = Utc.with_ymd_and_hms(2026, 8, 10, 16, 0, 0).unwrap();

    let summary = scheduler.tick(tick_at).expect("tick");
    assert_eq!(summary.reminders_sent, 0);
    assert_eq!(summary.delivery_failures, 1);

    // The slot was consumed despite the failure; the mock's expect(1) also
    // proves there is no second request.
    let summary = scheduler.tick(tick_at).expect("tick");
    assert_eq!(summary.delivery_failures, 0);
    mock.assert();
}
