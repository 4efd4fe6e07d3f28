//! Structured logging setup for the hub.

use crate::config::HubConfig;
use crate::config::LogFormat;
use once_cell::sync::OnceCell;
use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use std::io;
use std::io::IsTerminal;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Proof that the global subscriber is in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Installs the global tracing subscriber on first call.
///
/// Later calls return a new handle and leave the installed subscriber
/// untouched, whatever configuration they pass.
pub fn initialise(config: &HubConfig) -> PlaypenResult<TelemetryHandle> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &HubConfig) -> PlaypenResult<()> {
    let filter = EnvFilter::try_new(&config.log_filter).map_err(|error| {
        PlaypenError::new(
            "telemetry.filter_invalid",
            format!("invalid log filter `{}`: {error}", config.log_filter),
        )
    })?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(|error| {
        PlaypenError::new(
            "telemetry.install_failed",
            format!("failed to install log subscriber: {error}"),
        )
    })
}
