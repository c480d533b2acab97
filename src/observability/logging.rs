//! Structured logging.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary. State-machine events carry an `event` field
//! (`circuit_opened`, `circuit_closed`, `circuit_half_opened`, `call_failed`,
//! `manual_reset`) so log pipelines can match on it.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
