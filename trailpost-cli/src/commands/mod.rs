//! Command handlers -- one module per subcommand

pub mod check;
pub mod config;
pub mod rules;

use std::path::Path;

use tracing::info;

use trailpost_core::config::TrailpostConfig;

use crate::error::CliError;

/// Loads the config file and applies environment overrides without the
/// full validation, for commands that only need part of it.
pub(crate) async fn load_partial(config_path: &Path) -> Result<TrailpostConfig, CliError> {
    info!(path = %config_path.display(), "loading configuration");
    let mut config = TrailpostConfig::from_file(config_path).await?;
    config.apply_env_overrides()?;
    Ok(config)
}
