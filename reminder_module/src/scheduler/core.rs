use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use tracing::{debug, error, info, warn};

use crate::profile_store::{EntitlementState, ProfileStore, UserScheduleProfile};
use crate::timezone;

use super::eligibility::{due_warnings, EligibilityFilter};
use super::ledger::{SentLedger, SlotKey, WeeklyKind};
use super::messages;
use super::sink::DeliverySink;
use super::slots::ScheduleConfig;
use super::types::{NotificationCategory, NotificationEvent, SchedulerError, TickSummary};

/// How long after the last interaction a user still counts as active and is
/// left alone by emotion reminders.
const ACTIVE_INTERACTION_WINDOW_MINUTES: i64 = 15;

/// Ledger rows older than this many local days are dropped. The horizon
/// exceeds a full ISO week, so weekly and warning entries outlive the window
/// in which they still matter.
const LEDGER_RETENTION_DAYS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the next minute boundary.
    Idle,
    /// Processing one batch over all users.
    Ticking,
}

/// One due notification for one user, paired with its dedup key.
#[derive(Debug, Clone)]
pub(crate) struct DueItem {
    pub(crate) key: SlotKey,
    pub(crate) event: NotificationEvent,
}

/// Pure per-user decision function: everything that is due for this user at
/// this instant, before dedup and delivery are consulted. Keeping this free
/// of I/O is what makes the slot arithmetic testable on its own.
pub(crate) fn due_items(
    profile: &UserScheduleProfile,
    now: DateTime<Utc>,
    config: &ScheduleConfig,
) -> Vec<DueItem> {
    let local = timezone::local_time(now, profile.utc_offset_hours);
    let name = profile.display_name_or_default();
    let mut items = Vec::new();

    // Daily emotion-diary slots for the user's frequency.
    for slot in config.slot_table.slots_for(profile.notification_frequency) {
        if slot.hour() == local.time().hour() && slot.minute() == local.time().minute() {
            items.push(DueItem {
                key: SlotKey::Daily(*slot),
                event: NotificationEvent {
                    user_id: profile.user_id,
                    category: NotificationCategory::EmotionReminder,
                    body: messages::emotion_reminder_text(name, local),
                },
            });
        }
    }

    // Weekly messages fire independently of the daily frequency.
    let iso = local.date().iso_week();
    let weekly = [
        (
            config.weekly_motivation,
            WeeklyKind::Motivation,
            NotificationCategory::WeeklyMotivation,
            messages::weekly_motivation_text(name, iso.week()),
        ),
        (
            config.weekly_reflection,
            WeeklyKind::Reflection,
            NotificationCategory::WeeklyReflection,
            messages::weekly_reflection_text(name),
        ),
    ];
    for (slot, kind, category, body) in weekly {
        if local.date().weekday() == slot.weekday
            && slot.time.hour() == local.time().hour()
            && slot.time.minute() == local.time().minute()
        {
            items.push(DueItem {
                key: SlotKey::Weekly {
                    kind,
                    iso_year: iso.year(),
                    iso_week: iso.week(),
                },
                event: NotificationEvent {
                    user_id: profile.user_id,
                    category,
                    body,
                },
            });
        }
    }

    // Trial warnings for whichever thresholds have been crossed; the ledger
    // keeps each kind to one delivery per trial period.
    if let EntitlementState::TrialActive { ends_at } = profile.entitlement {
        for kind in due_warnings(profile, now) {
            items.push(DueItem {
                key: SlotKey::TrialWarning {
                    kind,
                    trial_ends_on: ends_at.date_naive(),
                },
                event: NotificationEvent {
                    user_id: profile.user_id,
                    category: NotificationCategory::TrialWarning,
                    body: messages::trial_warning_text(kind).to_string(),
                },
            });
        }
    }

    items
}

pub struct ReminderScheduler<S: DeliverySink> {
    store: ProfileStore,
    ledger: Box<dyn SentLedger>,
    sink: S,
    config: ScheduleConfig,
    send_spacing: Duration,
    state: LoopState,
    last_prune_date: Option<NaiveDate>,
}

impl<S: DeliverySink> ReminderScheduler<S> {
    pub fn new(
        store: ProfileStore,
        ledger: Box<dyn SentLedger>,
        sink: S,
        config: ScheduleConfig,
        send_spacing: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            sink,
            config,
            send_spacing,
            state: LoopState::Idle,
            last_prune_date: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run one batch over all users. Only a failure to load the user list
    /// aborts the tick (it is retried on the next interval); any per-user
    /// problem is logged and contained.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<TickSummary, SchedulerError> {
        self.tick_with_stop(now, None)
    }

    fn tick_with_stop(
        &mut self,
        now: DateTime<Utc>,
        stop: Option<&AtomicBool>,
    ) -> Result<TickSummary, SchedulerError> {
        self.state = LoopState::Ticking;
        let result = self.run_tick(now, stop);
        self.state = LoopState::Idle;
        result
    }

    fn run_tick(
        &mut self,
        now: DateTime<Utc>,
        stop: Option<&AtomicBool>,
    ) -> Result<TickSummary, SchedulerError> {
        let profiles = self.store.list_active_profiles()?;
        debug!("tick at {} over {} profile(s)", now, profiles.len());

        self.prune_if_new_day(now);

        let filter = EligibilityFilter::new(&self.store);
        let mut summary = TickSummary::default();

        for mut profile in profiles {
            if stop_requested(stop) {
                info!(
                    "stop requested, ending tick after {} user(s)",
                    summary.users_processed
                );
                break;
            }
            summary.users_processed += 1;
            self.process_profile(&filter, &mut profile, now, &mut summary);
        }

        if !stop_requested(stop) {
            self.process_pending_reflections(now, &mut summary);
        }

        if summary.total_sent() > 0 || summary.delivery_failures > 0 {
            info!(
                "tick done: {} reminder(s), {} motivation(s), {} weekly reflection(s), \
                 {} warning(s), {} session reflection(s), {} failure(s)",
                summary.reminders_sent,
                summary.motivations_sent,
                summary.reflections_sent,
                summary.warnings_sent,
                summary.session_reflections_sent,
                summary.delivery_failures
            );
        }
        Ok(summary)
    }

    fn process_profile(
        &self,
        filter: &EligibilityFilter<'_>,
        profile: &mut UserScheduleProfile,
        now: DateTime<Utc>,
        summary: &mut TickSummary,
    ) {
        // One eligibility decision per user per tick; every item computed
        // below is governed by it, including on the tick where the expiry
        // transition itself happens.
        let eligibility = filter.check(profile, now);
        if !eligibility.is_eligible() {
            debug!("user {} ineligible this tick: {:?}", profile.user_id, eligibility);
            return;
        }

        let local_date = timezone::local_time(now, profile.utc_offset_hours).date();
        let recently_active = is_recently_active(profile, now);

        for item in due_items(profile, now, &self.config) {
            if item.event.category == NotificationCategory::EmotionReminder && recently_active {
                // The user is mid-conversation; skip without consuming the
                // slot so it can still fire if they go idle within the
                // slot's minute.
                debug!("user {} recently active, skipping reminder", profile.user_id);
                continue;
            }
            match self.ledger.already_sent(profile.user_id, local_date, &item.key) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!("ledger lookup failed for user {}: {}", profile.user_id, err);
                    continue;
                }
            }
            self.deliver_and_record(&item, local_date, summary);
        }
    }

    fn deliver_and_record(
        &self,
        item: &DueItem,
        local_date: NaiveDate,
        summary: &mut TickSummary,
    ) {
        let event = &item.event;
        match self.sink.send(event.user_id, &event.body) {
            Ok(()) => {
                info!("sent {} to user {}", event.category.label(), event.user_id);
                summary.count_sent(event.category);
            }
            Err(err) => {
                // The slot is consumed either way; the next occurrence is
                // the retry point.
                warn!(
                    "failed to send {} to user {}: {}",
                    event.category.label(),
                    event.user_id,
                    err
                );
                summary.delivery_failures += 1;
            }
        }
        if let Err(err) = self
            .ledger
            .record_sent(event.user_id, local_date, &item.key)
        {
            warn!(
                "failed to record sent slot for user {}: {}",
                event.user_id, err
            );
        }
        if !self.send_spacing.is_zero() {
            thread::sleep(self.send_spacing);
        }
    }

    /// Reflection prompts are due by instant rather than by slot: one prompt
    /// per therapy session, a few hours after it, marked sent on any
    /// delivery outcome.
    fn process_pending_reflections(&self, now: DateTime<Utc>, summary: &mut TickSummary) {
        let pending = match self.store.pending_reflections(now) {
            Ok(pending) => pending,
            Err(err) => {
                warn!("failed to load pending reflections: {}", err);
                return;
            }
        };

        for reflection in pending {
            let profile = match self.store.get_profile(reflection.user_id) {
                Ok(Some(profile)) => profile,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        "failed to load profile {} for reflection: {}",
                        reflection.user_id, err
                    );
                    continue;
                }
            };
            let session_local =
                timezone::local_time(reflection.session_at, profile.utc_offset_hours);
            let body =
                messages::session_reflection_text(profile.display_name_or_default(), session_local);
            match self.sink.send(profile.user_id, &body) {
                Ok(()) => {
                    info!("sent session reflection to user {}", profile.user_id);
                    summary.session_reflections_sent += 1;
                }
                Err(err) => {
                    warn!(
                        "failed to send session reflection to user {}: {}",
                        profile.user_id, err
                    );
                    summary.delivery_failures += 1;
                }
            }
            if let Err(err) = self.store.mark_reflection_sent(reflection.session_id) {
                warn!(
                    "failed to mark reflection {} sent: {}",
                    reflection.session_id, err
                );
            }
            if !self.send_spacing.is_zero() {
                thread::sleep(self.send_spacing);
            }
        }
    }

    fn prune_if_new_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.last_prune_date == Some(today) {
            return;
        }
        let cutoff = today - chrono::Duration::days(LEDGER_RETENTION_DAYS);
        match self.ledger.prune_older_than(cutoff) {
            Ok(removed) => {
                if removed > 0 {
                    info!("pruned {} stale ledger entries", removed);
                }
                self.last_prune_date = Some(today);
            }
            Err(err) => warn!("ledger prune failed: {}", err),
        }
    }

    /// Fixed-cadence loop: ticks never overlap (an overrunning batch defers
    /// the next tick), and a stop request lets the in-flight tick finish its
    /// current user before the loop exits.
    pub fn run_loop(&mut self, interval: Duration, stop: &AtomicBool) {
        info!("reminder scheduler started (tick interval {:?})", interval);
        while !stop.load(Ordering::Relaxed) {
            let started = Utc::now();
            if let Err(err) = self.tick_with_stop(started, Some(stop)) {
                error!("tick failed: {}", err);
            }
            let elapsed = (Utc::now() - started).to_std().unwrap_or_default();
            sleep_with_stop(interval.saturating_sub(elapsed), stop);
        }
        info!("reminder scheduler stopped");
    }
}

fn stop_requested(stop: Option<&AtomicBool>) -> bool {
    stop.map(|flag| flag.load(Ordering::Relaxed)).unwrap_or(false)
}

fn is_recently_active(profile: &UserScheduleProfile, now: DateTime<Utc>) -> bool {
    match profile.last_activity_at {
        Some(last) => {
            now >= last
                && now - last <= chrono::Duration::minutes(ACTIVE_INTERACTION_WINDOW_MINUTES)
        }
        None => false,
    }
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool) {
    let slice = Duration::from_millis(250);
    let mut remaining = duration;
    while !remaining.is_zero() && !stop.load(Ordering::Relaxed) {
        let step = remaining.min(slice);
        thread::sleep(step);
        remaining -= step;
    }
}
