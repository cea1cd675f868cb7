//! Layered device configuration
//!
//! Priority, lowest to highest:
//! 1. Built-in defaults
//! 2. `[vestel]` section of a TOML file (`--config`, else `./evc.toml`,
//!    else `~/.config/evc/evc.toml`)
//! 3. `EVC_*` environment variables
//! 4. Command-line overrides

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use evc_core::{AddressBase, DeviceConfig};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "EVC_";

/// TOML table holding the device settings
pub const CONFIG_SECTION: &str = "vestel";

/// Keys accepted from every layer
const KEYS: [&str; 5] = ["ip", "port", "unit", "base", "timeout"];

/// Flat settings as they appear in files and the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VestelSection {
    pub ip: String,
    pub port: u16,
    pub unit: u8,
    pub base: u8,
    /// Seconds
    pub timeout: f64,
}

impl Default for VestelSection {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 502,
            unit: 1,
            base: 0,
            timeout: 2.0,
        }
    }
}

impl TryFrom<VestelSection> for DeviceConfig {
    type Error = anyhow::Error;

    fn try_from(section: VestelSection) -> Result<Self> {
        let base = AddressBase::try_from(section.base)?;
        let config = DeviceConfig {
            host: section.ip,
            port: section.port,
            unit_id: section.unit,
            address_base: base,
            timeout_secs: section.timeout,
        };
        config
            .validate()
            .map_err(|e| anyhow!("{} (use --ip, {}IP or the config file)", e, ENV_PREFIX))?;
        Ok(config)
    }
}

/// Command-line values; `None` leaves lower layers untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

/// Builds a [`DeviceConfig`] from every configuration layer
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
    env_prefix: String,
    overrides: Overrides,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            explicit: None,
            search_paths: default_search_paths(),
            env_prefix: ENV_PREFIX.to_string(),
            overrides: Overrides::default(),
        }
    }

    /// Use `path` instead of searching; it must exist
    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Config file that will be read, if any
    pub fn config_file(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.explicit {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path.clone()));
        }
        Ok(self.search_paths.iter().find(|p| p.is_file()).cloned())
    }

    pub fn figment(&self) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(VestelSection::default()));

        if let Some(path) = self.config_file()? {
            debug!("Loading configuration from {}", path.display());
            figment = figment.merge(Figment::from(Toml::file(&path)).focus(CONFIG_SECTION));
        }

        Ok(figment
            .merge(Env::prefixed(&self.env_prefix).only(&KEYS))
            .merge(Serialized::globals(&self.overrides)))
    }

    pub fn load(&self) -> Result<DeviceConfig> {
        let section: VestelSection = self
            .figment()?
            .extract()
            .context("Failed to load configuration")?;
        DeviceConfig::try_from(section)
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("evc.toml")];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(Path::new(&home).join(".config").join("evc").join("evc.toml"));
    }
    paths
}
