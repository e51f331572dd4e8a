use tracing::info;

use reminder_module::service::config::ServiceConfig;
use reminder_module::service::runner::start_scheduler_thread;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_target(false).init();
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env()?;
    info!(
        "starting reminder service (profiles: {}, ledger: {}, tick every {:?})",
        config.profiles_db_path.display(),
        config.ledger_db_path.display(),
        config.tick_interval
    );

    let mut control = start_scheduler_thread(&config)?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping scheduler");
    control.stop_and_join();
    Ok(())
}
