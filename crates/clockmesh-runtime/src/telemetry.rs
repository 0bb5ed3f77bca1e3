//! Diagnostic logging setup

use tracing_subscriber::EnvFilter;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`; `json` switches to one JSON object per line.
pub fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    }
}
