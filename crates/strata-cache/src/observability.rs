//! Process-wide `tracing` subscriber for binaries embedding the cache.
//!
//! The filter sits behind a reload layer so the level can change at runtime
//! without reinstalling the subscriber.

use std::sync::OnceLock;

use strata_core::CacheError;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Parses an `EnvFilter` directive string.
pub(crate) fn parse_filter(directives: &str) -> Result<EnvFilter, CacheError> {
    EnvFilter::try_new(directives)
        .map_err(|e| CacheError::config(format!("invalid log filter {directives:?}: {e}")))
}

/// Installs the global subscriber. A valid `RUST_LOG` takes precedence over
/// `logging.level`.
///
/// Returns `Ok(false)` when another subscriber is already installed; the
/// level of that subscriber cannot be changed through [`set_level`].
pub fn init(logging: &LoggingConfig) -> Result<bool, CacheError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&logging.level)?,
    };
    let (filter, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(logging.show_target))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER.set(handle);
    }
    Ok(installed)
}

/// Replaces the active filter, e.g. `strata_cache=debug,info`.
pub fn set_level(level: &str) -> Result<(), CacheError> {
    let filter = parse_filter(level)?;
    let handle = FILTER
        .get()
        .ok_or_else(|| CacheError::config("log filter is not reloadable: subscriber not installed by strata"))?;
    handle
        .reload(filter)
        .map_err(|e| CacheError::config(format!("log filter reload failed: {e}")))?;
    tracing::info!(level, "log filter changed");
    Ok(())
}
