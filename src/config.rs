use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Dozo";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that relocates the data directory (tests, sandboxes).
pub const DATA_DIR_ENV: &str = "DOZO_DATA_DIR";

/// Days of padding expanded on each side of the visible month, so adjacent
/// calendar navigation does not need a recomputation at the month boundary.
pub const EXPANSION_PADDING_DAYS: u64 = 15;

/// How many days past today the next-alarm scan looks before giving up.
pub const ALARM_HORIZON_DAYS: u64 = 7;

/// Notification channel used for every dose reminder.
pub const NOTIFICATION_CHANNEL_ID: &str = "medicine_channel";

/// Get the application data directory.
/// ~/Dozo/ unless `DOZO_DATA_DIR` is set; falls back to the temp dir when
/// no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Get the reminder database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("dozo.db")
}

/// Default `tracing` filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "dozo_lib=info,dozo=info"
}
