//! Tracing subscriber setup for binaries and tests embedding the engine

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a formatting subscriber. `RUST_LOG` takes precedence over
/// `level`; an unparsable level falls back to `info`.
///
/// Returns `false` when a global subscriber was already installed, so
/// repeated calls are harmless.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .try_init()
        .is_ok()
}

/// Install a subscriber at the configured level
pub fn init_from_config(config: &LoggingConfig) -> bool {
    init(&config.level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init("debug");
        assert!(!init("warn"));
        assert!(!init_from_config(&LoggingConfig::default()));
    }
}
