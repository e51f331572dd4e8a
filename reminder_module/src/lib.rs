pub mod profile_store;
pub mod scheduler;
pub mod service;
pub mod timezone;

pub use profile_store::{
    EntitlementState, PendingReflection, ProfileStore, ProfileStoreError, UserScheduleProfile,
};
pub use scheduler::{
    DeliveryError, DeliverySink, LoopState, MemoryLedger, NotificationCategory, NotificationEvent,
    ReminderScheduler, ScheduleConfig, SchedulerError, SentLedger, SlotKey, SlotTable,
    SqliteLedger, TelegramSink, TickSummary, WarningKind, WeeklyKind,
};
