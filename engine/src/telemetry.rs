//! Tracing setup for binaries and tests embedding the engine
//!
//! The filter comes from `RUST_LOG` and falls back to `info`. Installing a
//! second subscriber is a no-op.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Human-readable log lines
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// One JSON object per log line
pub fn init_tracing_json() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_tracing();
        init_tracing();
        init_tracing_json();
        tracing::info!(year = 2020, "Tracing initialized");
    }
}
