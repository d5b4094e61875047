//! Controller configuration.
//!
//! An optional TOML file supplies site-specific settings; command-line flags
//! override it. Every field has a default so a bare invocation works on a
//! typical single-connector setup.

use crate::constants::{DEFAULT_PORT, DEFAULT_WIRING_AMPS, OVERRIDE_FILE};
use crate::error::{Result, TwcError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Name of the config file looked up in the working directory when no
/// explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "twc-controller.toml";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Serial device of the RS-485 adapter
    #[serde(default = "Config::default_port")]
    pub port: String,
    /// Hard limit of the circuit feeding all connectors, in whole amps
    #[serde(default = "Config::default_wiring_max_amps")]
    pub wiring_max_amps: i32,
    /// Shell command polled for solar generation, if any
    #[serde(default)]
    pub solar_command: Option<String>,
    /// Operator override file, contents in 0.01 A units
    #[serde(default = "Config::default_override_file")]
    pub override_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            wiring_max_amps: Self::default_wiring_max_amps(),
            solar_command: None,
            override_file: Self::default_override_file(),
        }
    }
}

impl Config {
    fn default_port() -> String {
        DEFAULT_PORT.to_string()
    }

    fn default_wiring_max_amps() -> i32 {
        DEFAULT_WIRING_AMPS
    }

    fn default_override_file() -> String {
        OVERRIDE_FILE.to_string()
    }

    /// Load from an explicit path, from `twc-controller.toml` in the working
    /// directory, or fall back to defaults when neither exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let text = match path {
            Some(p) => fs::read_to_string(p)
                .map_err(|e| TwcError::Config(format!("{}: {}", p.display(), e)))?,
            None => {
                if !Path::new(DEFAULT_CONFIG_FILE).exists() {
                    return Ok(Self::default());
                }
                fs::read_to_string(DEFAULT_CONFIG_FILE)?
            }
        };
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| TwcError::Config(e.to_string()))?;
        if config.wiring_max_amps <= 0 {
            return Err(TwcError::Config(format!(
                "wiring_max_amps must be positive, got {}",
                config.wiring_max_amps
            )));
        }
        Ok(config)
    }
}
