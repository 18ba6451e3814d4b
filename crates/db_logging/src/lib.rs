#![deny(missing_docs)]
//! Logging facade for the mock database crates.
//!
//! Store code logs through the `db_*` macros so the backend stays a choice
//! of the binary or test harness. [`initialize_for_tests`] installs a
//! `simplelog` terminal logger whose level can be raised or lowered with the
//! `MOCKDB_LOG` environment variable.

use log::LevelFilter;

/// Environment variable holding a level name (`off`, `error` ... `trace`).
pub const LOG_LEVEL_ENV: &str = "MOCKDB_LOG";

/// Logs at trace level, used for per-record detail.
#[macro_export]
macro_rules! db_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs at debug level.
#[macro_export]
macro_rules! db_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs at info level.
#[macro_export]
macro_rules! db_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs at warn level.
#[macro_export]
macro_rules! db_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs at error level.
#[macro_export]
macro_rules! db_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Level used by [`initialize_for_tests`]: `MOCKDB_LOG` when it names a
/// valid level, else debug in debug builds and info otherwise.
pub fn test_level() -> LevelFilter {
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
}

/// Installs a terminal logger at `level`.
///
/// Returns false when a global logger was already installed.
pub fn initialize(level: LevelFilter) -> bool {
    use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_time_level(LevelFilter::Off)
        .build();
    TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto).is_ok()
}

/// Installs the test logger once; later calls from other tests are no-ops.
pub fn initialize_for_tests() {
    let _ = initialize(test_level());
}
