//! Console logging setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is up to
//! the embedding application. This helper covers the common case of
//! printing to stderr with a verbosity knob.

use tracing_subscriber::EnvFilter;

/// Maps a verbosity count to a filter directive.
///
/// 0 shows warnings and errors, 1 adds per-operation info, 2 or more adds
/// per-record debug output.
pub fn verbosity_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Installs a global console subscriber.
///
/// `RUST_LOG` overrides the verbosity when set. Returns false if a global
/// subscriber was already installed.
pub fn enable_console_logging(verbosity: u8) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
