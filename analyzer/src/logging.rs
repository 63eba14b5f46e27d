//! Logging configuration for chainlint
//!
//! This module provides utilities for initializing and configuring logging
//! using the `log` and `env_logger` crates.
//!
//! # Usage
//!
//! ```rust,ignore
//! use analyzer::logging;
//!
//! // Initialize with default level (Warn)
//! logging::init();
//!
//! // Or initialize from RUST_LOG environment variable
//! logging::init_from_env();
//!
//! // Or initialize with a specific level
//! logging::init_with_level(log::LevelFilter::Debug);
//! ```
//!
//! # Log Levels
//!
//! The analyzer uses log levels as follows:
//!
//! - `error!` - Failures that abort the run (unreadable sources)
//! - `warn!` - Inputs that were skipped (unparsable external files)
//! - `info!` - High-level progress (directive collection, analysis phases)
//! - `debug!` - Per-function progress and every recorded violation
//! - `trace!` - Very verbose (root tracing steps, individual uses)
//!
//! # Environment Variable
//!
//! Set `RUST_LOG` to control logging at runtime:
//!
//! ```bash
//! RUST_LOG=warn chainlint check program.json  # Default, quiet output
//! RUST_LOG=info chainlint check program.json  # Show analysis phases
//! RUST_LOG=analyzer::tracer=trace chainlint check program.json
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging with sensible defaults (Warn level).
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level.
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {}:{} - {}",
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from the RUST_LOG environment variable.
///
/// If RUST_LOG is not set, defaults to Warn level.
pub fn init_from_env() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests.
///
/// ```rust,ignore
/// #[test]
/// fn test_something() {
///     analyzer::logging::init_test();
/// }
/// ```
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}

/// Check if `init`, `init_with_level` or `init_from_env` has run.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
