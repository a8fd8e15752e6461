//! Logging setup for the bpscope crates.
//!
//! All bpscope crates log through the standard [`log`] facade; this crate
//! only exists so that binaries and tests have a one-call way of turning
//! those logs into terminal output.

pub use log::{Level, LevelFilter, debug, error, info, trace, warn};

/// Default log filter used when `RUST_LOG` is not set.
const DEFAULT_RUST_LOG: &str = "info";

/// Set up text logging to stderr for the current process.
///
/// Respects the `RUST_LOG` environment variable, defaulting to `info`
/// when unset. Safe to call more than once (later calls are no-ops).
pub fn setup_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.to_owned());

    let _ = env_logger::Builder::new()
        .parse_filters(&filter)
        .format_timestamp_millis()
        .try_init();
}
