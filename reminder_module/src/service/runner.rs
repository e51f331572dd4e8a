use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::profile_store::ProfileStore;
use crate::scheduler::{ReminderScheduler, SqliteLedger, TelegramSink};

use super::config::ServiceConfig;
use super::BoxError;

/// Handle to the background scheduler thread. Dropping it does not stop the
/// thread; call `stop_and_join` for a clean shutdown.
pub struct SchedulerControl {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SchedulerControl {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn start_scheduler_thread(config: &ServiceConfig) -> Result<SchedulerControl, BoxError> {
    let store = ProfileStore::new(&config.profiles_db_path)?;
    let ledger = SqliteLedger::new(&config.ledger_db_path)?;
    let sink = TelegramSink::new(config.telegram_bot_token.clone(), config.delivery_timeout);
    let mut scheduler = ReminderScheduler::new(
        store,
        Box::new(ledger),
        sink,
        config.schedule.clone(),
        config.send_spacing,
    );

    let stop = Arc::new(AtomicBool::new(false));
    let tick_interval = config.tick_interval;
    let handle = {
        let stop = stop.clone();
        thread::spawn(move || {
            scheduler.run_loop(tick_interval, &stop);
        })
    };

    Ok(SchedulerControl {
        stop,
        handle: Some(handle),
    })
}
