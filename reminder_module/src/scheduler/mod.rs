mod core;
mod eligibility;
mod ledger;
mod messages;
mod sink;
mod slots;
mod types;


pub use self::core::{LoopState, ReminderScheduler};
pub use eligibility::{due_warnings, Eligibility, EligibilityFilter, IneligibleReason};
pub use ledger::{
    LedgerError, MemoryLedger, SentLedger, SlotKey, SqliteLedger, WarningKind, WeeklyKind,
};
pub use sink::{DeliveryError, DeliverySink, TelegramSink};
pub use slots::{
    ScheduleConfig, ScheduleConfigError, SlotTable, WeeklySlot, RECOGNIZED_FREQUENCIES,
};
pub use types::{NotificationCategory, NotificationEvent, SchedulerError, TickSummary};
