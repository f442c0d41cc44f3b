//! Runtime configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tether::TetherConfig;
use tracing::{info, warn};

use crate::features::PinSpec;

/// Contents of `tether.toml`: the library tunables plus `[[pin]]` tables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunConfig {
    #[serde(flatten)]
    pub tether: TetherConfig,
    #[serde(default, rename = "pin")]
    pub pins: Vec<PinSpec>,
}

pub fn parse_config(text: &str) -> Result<RunConfig> {
    toml::from_str(text).context("invalid configuration")
}

/// Load `path`, falling back to defaults when it is missing or malformed.
pub fn load_config(path: &Path) -> RunConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("No config at {}, using defaults", path.display());
            return RunConfig::default();
        }
        Err(e) => {
            warn!("Failed to read config {}: {}, using defaults", path.display(), e);
            return RunConfig::default();
        }
    };

    match parse_config(&text) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load config {}: {:#}, using defaults", path.display(), e);
            RunConfig::default()
        }
    }
}
