//! Configuration display

use flowwatch_ids::IdsConfig;

use crate::error::CliResult;

/// Render the effective configuration as TOML.
pub fn render(config: &IdsConfig) -> CliResult<String> {
    Ok(config.to_toml_string()?)
}

/// Print the effective configuration.
pub fn execute(config: &IdsConfig) -> CliResult<()> {
    print!("{}", render(config)?);
    Ok(())
}
