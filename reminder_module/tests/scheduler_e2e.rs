use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use reminder_module::{
    DeliveryError, DeliverySink, EntitlementState, MemoryLedger, ProfileStore, ReminderScheduler,
    ScheduleConfig, SqliteLedger,
};

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(i64, String)>>,
    fail_for: Vec<i64>,
}

impl RecordingSink {
    fn failing_for(user_ids: &[i64]) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_for: user_ids.to_vec(),
        })
    }

    fn recording() -> Arc<Self> {
        Self::failing_for(&[])
    }

    fn deliveries(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn deliveries_to(&self, user_id: i64) -> usize {
        self.deliveries()
            .iter()
            .filter(|(id, _)| *id == user_id)
            .count()
    }
}

impl DeliverySink for Arc<RecordingSink> {
    fn send(&self, user_id: i64, text: &str) -> Result<(), DeliveryError> {
        if self.fail_for.contains(&user_id) {
            return Err(DeliveryError::Other("simulated outage".to_string()));
        }
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }
}

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

fn register_user(
    store: &ProfileStore,
    user_id: i64,
    frequency: i64,
    offset_hours: i64,
    now: DateTime<Utc>,
) {
    store
        .complete_registration(user_id, "Alex", chrono::Duration::days(14), now)
        .expect("register");
    store
        .set_notification_frequency(user_id, frequency)
        .expect("frequency");
    store
        .set_timezone(user_id, offset_hours, "UTC+0")
        .expect("timezone");
}

fn scheduler_with(
    temp: &TempDir,
    sink: Arc<RecordingSink>,
) -> ReminderScheduler<Arc<RecordingSink>> {
    let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
    let ledger = SqliteLedger::new(temp.path().join("ledger.db")).expect("ledger");
    ReminderScheduler::new(
        store,
        Box::new(ledger),
        sink,
        ScheduleConfig::default(),
        Duration::ZERO,
    )
}

#[test]
fn reminder_fires_once_per_slot_per_day() {
    let temp = TempDir::new().expect("tempdir");
    let registered_at = at(2026, 8, 10, 9, 0);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 1, 0, registered_at);
    }
    let sink = RecordingSink::recording();
    let mut scheduler = scheduler_with(&temp, sink.clone());

    // Frequency 1 fires at 16:00 local.
    let summary = scheduler.tick(at(2026, 8, 10, 16, 0)).expect("tick");
    assert_eq!(summary.reminders_sent, 1);
    assert_eq!(sink.deliveries_to(100), 1);

    // A second pass in the same minute is suppressed by the ledger.
    let summary = scheduler.tick(at(2026, 8, 10, 16, 0)).expect("tick");
    assert_eq!(summary.reminders_sent, 0);
    assert_eq!(sink.deliveries_to(100), 1);

    // Off-slot minutes never fire.
    let summary = scheduler.tick(at(2026, 8, 10, 16, 1)).expect("tick");
    assert_eq!(summary.reminders_sent, 0);

    // The next local day the slot opens again.
    let summary = scheduler.tick(at(2026, 8, 11, 16, 0)).expect("tick");
    assert_eq!(summary.reminders_sent, 1);
    assert_eq!(sink.deliveries_to(100), 2);
}

#[test]
fn delivery_failure_is_isolated_and_consumes_the_slot() {
    let temp = TempDir::new().expect("tempdir");
    let registered_at = at(2026, 8, 10, 9, 0);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 1, 0, registered_at);
        register_user(&store, 200, 1, 0, registered_at);
    }
    let sink = RecordingSink::failing_for(&[100]);
    let mut scheduler = scheduler_with(&temp, sink.clone());

    let summary = scheduler.tick(at(2026, 8, 10, 16, 0)).expect("tick");
    assert_eq!(summary.delivery_failures, 1);
    assert_eq!(summary.reminders_sent, 1);
    assert_eq!(sink.deliveries_to(100), 0);
    assert_eq!(sink.deliveries_to(200), 1);

    // The failed user's slot is consumed: no retry storm in the same minute.
    let summary = scheduler.tick(at(2026, 8, 10, 16, 0)).expect("tick");
    assert_eq!(summary.delivery_failures, 0);
    assert_eq!(summary.reminders_sent, 0);
}

#[test]
fn expired_trial_blocks_delivery_and_is_written_back() {
    let temp = TempDir::new().expect("tempdir");
    // Registration 15 days before the tick: the 14-day trial is over.
    let registered_at = at(2026, 7, 26, 16, 0);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 1, 0, registered_at);
    }
    let sink = RecordingSink::recording();
    let mut scheduler = scheduler_with(&temp, sink.clone());

    let summary = scheduler.tick(at(2026, 8, 10, 16, 0)).expect("tick");
    assert_eq!(summary.reminders_sent, 0);
    assert!(sink.deliveries().is_empty());

    let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
    let profile = store.get_profile(100).expect("get").expect("exists");
    assert_eq!(profile.entitlement, EntitlementState::TrialExpired);
}

#[test]
fn trial_ending_at_tick_instant_expires_on_that_tick() {
    let temp = TempDir::new().expect("tempdir");
    let tick_at = at(2026, 8, 10, 16, 0);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 1, 0, tick_at - chrono::Duration::days(14));
    }
    let sink = RecordingSink::recording();
    let mut scheduler = scheduler_with(&temp, sink.clone());

    let summary = scheduler.tick(tick_at).expect("tick");
    assert_eq!(summary.reminders_sent, 0);
    assert!(sink.deliveries().is_empty());

    let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
    let profile = store.get_profile(100).expect("get").expect("exists");
    assert_eq!(profile.entitlement, EntitlementState::TrialExpired);
}

#[test]
fn weekly_motivation_fires_once_per_week_across_restart() {
    let temp = TempDir::new().expect("tempdir");
    let registered_at = at(2026, 8, 3, 9, 0);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 0, 0, registered_at);
        // Premium keeps trial warnings out of this scenario.
        store
            .update_entitlement(100, EntitlementState::Premium)
            .expect("grant");
    }
    let sink = RecordingSink::recording();

    // 2026-08-09 is a Sunday; the motivation slot is 10:00 local.
    {
        let mut scheduler = scheduler_with(&temp, sink.clone());
        let summary = scheduler.tick(at(2026, 8, 9, 10, 0)).expect("tick");
        assert_eq!(summary.motivations_sent, 1);
    }

    // A restarted scheduler with the same ledger does not resend this week.
    {
        let mut scheduler = scheduler_with(&temp, sink.clone());
        let summary = scheduler.tick(at(2026, 8, 9, 10, 0)).expect("tick");
        assert_eq!(summary.motivations_sent, 0);
    }

    // The following Sunday it fires again.
    {
        let mut scheduler = scheduler_with(&temp, sink.clone());
        let summary = scheduler.tick(at(2026, 8, 16, 10, 0)).expect("tick");
        assert_eq!(summary.motivations_sent, 1);
    }

    assert_eq!(sink.deliveries_to(100), 2);
}

#[test]
fn trial_warnings_fire_once_each_even_when_both_are_due() {
    let temp = TempDir::new().expect("tempdir");
    let tick_at = at(2026, 8, 10, 3, 17);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        // Trial ends in 20 hours: both the 3-day and 1-day thresholds are
        // crossed, e.g. after scheduler downtime.
        let registered_at = tick_at + chrono::Duration::hours(20) - chrono::Duration::days(14);
        register_user(&store, 100, 0, 0, registered_at);
    }
    let sink = RecordingSink::recording();
    let mut scheduler = scheduler_with(&temp, sink.clone());

    let summary = scheduler.tick(tick_at).expect("tick");
    assert_eq!(summary.warnings_sent, 2);

    // Neither warning repeats on later ticks.
    let summary = scheduler
        .tick(tick_at + chrono::Duration::minutes(1))
        .expect("tick");
    assert_eq!(summary.warnings_sent, 0);
    assert_eq!(sink.deliveries_to(100), 2);
}

#[test]
fn session_reflection_prompted_once() {
    let temp = TempDir::new().expect("tempdir");
    let tick_at = at(2026, 8, 10, 3, 17);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 0, 0, at(2026, 8, 3, 9, 0));
        store
            .add_therapy_session(100, tick_at - chrono::Duration::hours(6))
            .expect("session");
    }
    let sink = RecordingSink::recording();
    let mut scheduler = scheduler_with(&temp, sink.clone());

    let summary = scheduler.tick(tick_at).expect("tick");
    assert_eq!(summary.session_reflections_sent, 1);

    let summary = scheduler
        .tick(tick_at + chrono::Duration::minutes(1))
        .expect("tick");
    assert_eq!(summary.session_reflections_sent, 0);
    assert_eq!(sink.deliveries_to(100), 1);
}

#[test]
fn recently_active_user_is_not_interrupted() {
    let temp = TempDir::new().expect("tempdir");
    let tick_at = at(2026, 8, 10, 16, 0);
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 1, 0, at(2026, 8, 10, 9, 0));
        store
            .record_activity(100, tick_at - chrono::Duration::minutes(5))
            .expect("activity");
    }
    let sink = RecordingSink::recording();
    let mut scheduler = scheduler_with(&temp, sink.clone());

    // Mid-conversation: the reminder is skipped without consuming the slot.
    let summary = scheduler.tick(tick_at).expect("tick");
    assert_eq!(summary.reminders_sent, 0);

    // Once the last interaction is old enough the same slot still fires.
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        store
            .record_activity(100, tick_at - chrono::Duration::minutes(20))
            .expect("activity");
    }
    let summary = scheduler.tick(tick_at).expect("tick");
    assert_eq!(summary.reminders_sent, 1);
    assert_eq!(sink.deliveries_to(100), 1);
}

#[test]
fn memory_ledger_backs_the_scheduler_too() {
    let temp = TempDir::new().expect("tempdir");
    {
        let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
        register_user(&store, 100, 1, 0, at(2026, 8, 10, 9, 0));
    }
    let sink = RecordingSink::recording();
    let store = ProfileStore::new(temp.path().join("profiles.db")).expect("store");
    let mut scheduler = ReminderScheduler::new(
        store,
        Box::new(MemoryLedger::new()),
        sink.clone(),
        ScheduleConfig::default(),
        Duration::ZERO,
    );

    let summary = scheduler.tick(at(2026, 8, 10, 16, 0)).expect("tick");
    assert_eq!(summary.reminders_sent, 1);
    let summary = scheduler.tick(at(2026, 8, 10, 16, 0)).expect("tick");
    assert_eq!(summary.reminders_sent, 0);
}
