//! Logging setup driven by [`GeneralConfig`].
//!
//! The store itself only emits `tracing` events. Whoever owns the process
//! (a service, a bench harness) installs a subscriber once via
//! [`init_tracing`]; `RUST_LOG` overrides `general.log_level` when set.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::config::GeneralConfig;
use crate::error::{Result, StoreError};

/// Build the filter for `general.log_level`.
///
/// # Errors
/// Returns `StoreError::Config` if the level is not one of `off`, `error`,
/// `warn`, `info`, `debug` or `trace`.
pub fn log_filter(general: &GeneralConfig) -> Result<EnvFilter> {
    let level: LevelFilter = general.log_level.trim().parse().map_err(|_| {
        StoreError::Config(format!("general.log_level: unknown level '{}'", general.log_level))
    })?;
    Ok(EnvFilter::default().add_directive(level.into()))
}

/// Install a global `fmt` subscriber.
///
/// Returns `false` if another subscriber was already installed.
///
/// # Errors
/// Returns `StoreError::Config` for an unknown log level.
pub fn init_tracing(general: &GeneralConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => log_filter(general)?,
    };
    let installed = tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok();
    if installed {
        tracing::debug!(level = %general.log_level, "Tracing initialised");
    }
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn general(level: &str) -> GeneralConfig {
        GeneralConfig {
            log_level: level.to_string(),
        }
    }

    #[test]
    fn configured_level_caps_the_filter() {
        let filter = log_filter(&general("debug")).expect("filter");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let filter = log_filter(&general(" WARN ")).expect("filter");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn default_level_is_info() {
        let filter = log_filter(&GeneralConfig::default()).expect("filter");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn unknown_level_is_config_error() {
        assert!(matches!(
            log_filter(&general("chatty")),
            Err(StoreError::Config(_))
        ));
    }
}
