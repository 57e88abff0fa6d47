pub mod analyze;
pub mod config;
pub mod database;
pub mod stages;

use crate::core::Config;
use std::path::Path;

/// Load the configuration the way every command does
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Ok(Config::load_or_default(path)?)
}
