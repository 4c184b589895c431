//! Logging setup for the listener server.

use log::LevelFilter;

use crate::config::LoggingConfig;

/// Initialize the logging implementation. Defaults to `Trace` verbosity for
/// the listener crates and `Warn` for dependencies, until the configured
/// verbosity is applied.
pub fn init_logger() {
    env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .filter_module("cryptonote_listener", LevelFilter::Trace)
        .filter_module("cryptonote_listener_server", LevelFilter::Trace)
        .init();
}

/// Cap the global log level at the configured verbosity.
pub fn set_verbosity(config: LoggingConfig) {
    log::set_max_level(config.verbosity);
}
