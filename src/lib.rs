pub mod config;
pub mod models;
pub mod db;
pub mod schedule; // Recurrence expansion + next-alarm resolution
pub mod platform; // Alarm / notification collaborators
pub mod home; // Home calendar state
pub mod forms; // Medicine entry form
pub mod reminders; // Reminder service

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use platform::TracingPlatform;
use reminders::{ReminderError, ReminderService};
use schedule::SystemClock;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Headless launch: open the local database and re-register every
/// medicine's next alarm.
pub fn run() -> Result<(), ReminderError> {
    init_tracing();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let db_path = config::database_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(path = %db_path.display(), "Database opened");

    let platform = Arc::new(TracingPlatform);
    let service = ReminderService::open(conn, platform.clone(), platform, SystemClock)?;
    let scheduled = service.reschedule_all()?;

    let today = service.snapshot();
    tracing::info!(
        date = %today.selected_date,
        doses = today.dose_count,
        taken = today.taken_dose_count,
        scheduled,
        "Ready"
    );
    Ok(())
}
