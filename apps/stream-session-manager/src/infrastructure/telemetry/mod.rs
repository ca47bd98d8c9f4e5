//! Tracing Initialization
//!
//! Structured logging via `tracing` with an env-driven filter.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level directives (default: `stream_session_manager=info`)

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// Idempotent: a second call (e.g. from a test harness) is a no-op
/// instead of a panic.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env().add_directive(
        "stream_session_manager=info"
            .parse()
            .expect("static directive 'stream_session_manager=info' is valid"),
    );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
