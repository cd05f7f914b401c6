//! Console logging setup.
//!
//! Diagnostics go to stderr via `tracing` so the stdout report summary stays
//! clean. `RUST_LOG` overrides the default level.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize the logging system. Defaults to `info` unless `RUST_LOG` says
/// otherwise.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}
