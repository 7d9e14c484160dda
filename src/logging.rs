//! Tracing setup for the provider process.
//!
//! Everything is written to **stderr**. Stdout carries only the handshake
//! line the host reads to find the gRPC address.
//!
//! Filtering follows `RUST_LOG`, e.g.
//!
//! ```bash
//! RUST_LOG=twingate_provider::client=debug terraform-provider-twingate
//! ```
//!
//! With `debug` enabled on the client, every API call logs its
//! `X-Twingate-Request-Id` so it can be matched against server logs.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LEVEL: &str = "info";

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the global subscriber at `info` unless `RUST_LOG` says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    subscriber(DEFAULT_LEVEL).init();
}

/// Like [`init_logging`] with a different fallback level.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Returns `false` if a subscriber was already installed.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LEVEL).try_init().is_ok()
}
