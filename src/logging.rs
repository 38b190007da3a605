//! Logging initialization: env-filter driven, verbosity-tiered
//! `tracing-subscriber` setup, with thread ids and line numbers attached for
//! anything above the default level.

use tracing_subscriber::EnvFilter;

/// `verbosity` follows the usual CLI convention: 0 = warnings and errors
/// only, 1 = info, 2 = debug, 3+ = trace. `RUST_LOG`, if set, always wins.
pub fn init_logging(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_thread_ids(verbosity >= 2)
        .with_line_number(verbosity >= 2);

    if subscriber.try_init().is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
