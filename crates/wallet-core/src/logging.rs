//! Structured logging setup.
//!
//! Installs a `tracing` subscriber writing to stderr, with `RUST_LOG`
//! overriding the configured default filter.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for local runs.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" in any case; anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber.
///
/// `default_level` takes `EnvFilter` directives such as
/// `"info"` or `"wallet_core=debug,chain_ada=info"`. Fails if a global
/// subscriber is already set.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<(), WalletError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init(),
    };
    installed.map_err(|e| WalletError::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(?format, "logging initialized");
    Ok(())
}
