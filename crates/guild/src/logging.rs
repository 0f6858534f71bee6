//! Process-wide tracing setup.
//!
//! Library code logs through both `log` and `tracing`; [`init`] installs a
//! `tracing-subscriber` registry and bridges `log` records into it.

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::GuildError;

/// Install the global subscriber. `RUST_LOG`, when set, takes precedence over
/// `config.filter`. Fails if a global subscriber or logger already exists.
pub fn init(config: &LoggingConfig) -> Result<(), GuildError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&config.filter)?,
    };

    let json = config.json;
    let subscriber = Registry::default()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_current_span(true)))
        .with((!json).then(|| fmt::layer().with_target(true)));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| GuildError::Logging(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| GuildError::Logging(e.to_string()))?;

    Ok(())
}

pub(crate) fn parse_filter(directive: &str) -> Result<EnvFilter, GuildError> {
    EnvFilter::try_new(directive)
        .map_err(|e| GuildError::Logging(format!("invalid filter '{}': {}", directive, e)))
}
