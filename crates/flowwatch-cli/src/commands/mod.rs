//! Command implementations

pub mod config;
pub mod run;

use flowwatch_ids::IdsConfig;
use tracing::info;

use crate::error::CliResult;

/// Load the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&str>) -> CliResult<IdsConfig> {
    match path {
        Some(p) => {
            info!(path = p, "loading configuration");
            Ok(IdsConfig::load(p)?)
        }
        None => Ok(IdsConfig::default()),
    }
}
