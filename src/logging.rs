//! `env_logger` setup.
//!
//! Log levels follow these conventions:
//! - ERROR: phase failures and the failure-context dump
//! - WARN: orderly peer close, best-effort cleanup that did not work
//! - INFO: phase transitions and session milestones
//! - DEBUG: payloads sent and received, indicator colors

use env_logger::Env;

/// Initialize logging. `RUST_LOG` overrides the default `info` level.
pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Initialize logging for tests.
///
/// Uses `try_init` so repeated calls from many tests do not panic.
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
