//! Process-wide tracing setup for hosts and tests.
//!
//! Library code logs through `log`; [`init_tracing`] bridges those records
//! into a `tracing-subscriber` pipeline filtered by `RUST_LOG`.

use std::sync::Mutex;

use serde::Deserialize;
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: Mutex<bool> = Mutex::new(false);

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to bridge log records: {0}")]
    Logger(#[from] log::SetLoggerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
        }
    }
}

/// Installs the global subscriber with `default_filter` as fallback.
pub fn init_tracing(default_filter: &str) -> Result<(), TelemetryError> {
    init_with(&TelemetryConfig {
        default_filter: default_filter.to_string(),
        ..TelemetryConfig::default()
    })
}

/// Installs the global subscriber once. Later calls return `Ok(())` without
/// touching the installed one.
pub fn init_with(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let mut installed = match INSTALLED.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *installed {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json()))
        .with((!config.json).then(fmt::layer));

    LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber)?;
    *installed = true;

    log::debug!("Tracing initialised (json: {})", config.json);
    Ok(())
}
