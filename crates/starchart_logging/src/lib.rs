#![deny(missing_docs)]
//! Shared logging utilities for the starchart workspace.
//!
//! This crate provides the `chart_*` logging macros used across the codebase,
//! the `critical`/`validate` recovery helpers, and a minimal test initializer
//! for the global logger.

use std::fmt::Display;

#[doc(hidden)]
pub use log;

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! chart_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! chart_info {
    ($($arg:tt)*) => {{
        $crate::log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! chart_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! chart_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! chart_error {
    ($($arg:tt)*) => {{
        $crate::log::error!($($arg)*);
    }};
}

/// Reports a critical failure and recovers through `fallback`.
///
/// The message is logged at error level with a `[CRITICAL]` marker, then the
/// fallback runs and its value is returned. A fallback that itself fails is
/// logged and swallowed, yielding `None`; this never panics.
pub fn critical<T, E, F>(message: &str, fallback: F) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    log::error!("[CRITICAL] {message}");
    match fallback() {
        Ok(value) => Some(value),
        Err(err) => {
            log::error!("[CRITICAL] fallback execution failed: {err}");
            None
        }
    }
}

/// Non-fatal structural check: returns `condition` and warns when it is false.
pub fn validate(condition: bool, message: &str) -> bool {
    if !condition {
        log::warn!("validation failed: {message}");
    }
    condition
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
