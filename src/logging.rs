use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "mcp_record_server=info,warn";

/// Install the process-wide subscriber. Logs go to stderr; stdout carries
/// the protocol.
///
/// Library code only emits through `tracing`, so embedders and tests can
/// install their own (scoped) subscriber instead. Without one, emission is
/// a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(false)
        .init();
}
