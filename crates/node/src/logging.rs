//! Process-wide logging setup.

use crate::ConfigError;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"info,concord_handle=debug"`).
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_logging(default_filter: &str) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|err| ConfigError::Invalid(format!("log filter {default_filter:?}: {err}")))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| ConfigError::Invalid(format!("logging already initialized: {err}")))
}
