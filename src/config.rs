//! Service configuration.
//!
//! Loaded from a TOML file (default `./assign_config.toml`). Every field has
//! a default so a missing file or a partial file is usable; the service can
//! run against the current directory with stock settings.

use serde::Deserialize;
use std::error::Error;
use std::path::Path;

use crate::model::{DEFAULT_MAX_PROP, DEFAULT_OUTLET_SENTINEL};

/// Default configuration file path, relative to the invocation directory.
pub const DEFAULT_CONFIG_PATH: &str = "./assign_config.toml";

// ---------------------------------------------------------------------------
// Configuration types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssignConfig {
    /// Working directory holding `gis_inputs/` and receiving the outputs.
    pub workdir: String,
    /// Max number of stream segments to propagate up/downstream of a gauge.
    pub max_prop: u32,
    /// `downstream_id` value that marks the network outlet.
    pub outlet_sentinel: i64,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level: "debug", "info", "warn", "error".
    pub level: String,
    /// Log file path; empty means console only.
    pub file: String,
    /// Whether console output carries timestamps.
    pub timestamps: bool,
}

impl Default for AssignConfig {
    fn default() -> Self {
        AssignConfig {
            workdir: ".".to_string(),
            max_prop: DEFAULT_MAX_PROP,
            outlet_sentinel: DEFAULT_OUTLET_SENTINEL,
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            file: String::new(),
            timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the configuration from `path`.
///
/// A missing file yields the defaults; an unreadable or unparseable file is
/// an error, since silently ignoring a present-but-broken config would run
/// the pipeline with settings the operator did not ask for.
pub fn load_config(path: &str) -> Result<AssignConfig, Box<dyn Error>> {
    if !Path::new(path).exists() {
        return Ok(AssignConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config: AssignConfig = toml::from_str(&raw)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
