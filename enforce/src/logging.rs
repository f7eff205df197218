//! Diagnostic tracing for the enforcement hook.
//!
//! Everything goes to stderr: stdout carries the hook decision and must stay
//! a single JSON line. Diagnostics never influence decisions.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// With `debug` set (from `GSD_DEBUG` / `GSD_ENFORCE_DEBUG`) the filter is
/// `gsd_enforce=debug`. Otherwise `RUST_LOG` applies, defaulting to `warn`.
/// Output: stderr, compact, no ANSI colors.
///
/// # Example
/// ```bash
/// echo '{"hook_event_name":"Stop","session_id":"s"}' | GSD_DEBUG=1 gsd-enforce
/// ```
pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::new("gsd_enforce=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .compact(),
        )
        .try_init();
}
