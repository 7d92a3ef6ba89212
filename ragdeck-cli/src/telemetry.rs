//! Tracing initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` takes precedence over `verbosity`, which maps 0 → `warn`,
/// 1 → `info`, 2 → `debug` and anything higher → `trace`.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a subscriber is already set.
pub fn init_tracing(verbosity: u8, json: bool) -> anyhow::Result<()> {
    let env_filter = create_env_filter(verbosity)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false).with_writer(std::io::stderr)).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn create_env_filter(verbosity: u8) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbosity)))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "info");
        assert_eq!(default_directive(2), "debug");
        assert_eq!(default_directive(9), "trace");
    }
}
