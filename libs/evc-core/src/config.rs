//! Device connection settings
//!
//! Supplied by the caller (CLI or HTTP listener); the engine never reads
//! ambient state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MODBUS_PORT;
use crate::error::{EvcError, Result};

/// Offset convention subtracted from every native register address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AddressBase {
    /// Addresses are sent as listed in the vendor table
    #[default]
    Zero,
    /// Addresses are sent one lower than listed
    One,
}

impl AddressBase {
    pub fn offset(self) -> u16 {
        match self {
            AddressBase::Zero => 0,
            AddressBase::One => 1,
        }
    }

    /// Wire address for a native address
    pub fn apply(self, native: u16) -> Result<u16> {
        native.checked_sub(self.offset()).ok_or_else(|| {
            EvcError::validation(format!(
                "address {} cannot be sent with address base {}",
                native,
                self.offset()
            ))
        })
    }
}

impl TryFrom<u8> for AddressBase {
    type Error = EvcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(AddressBase::Zero),
            1 => Ok(AddressBase::One),
            other => Err(EvcError::config(format!(
                "address base must be 0 or 1, got {}",
                other
            ))),
        }
    }
}

impl From<AddressBase> for u8 {
    fn from(base: AddressBase) -> Self {
        base.offset() as u8
    }
}

/// Connection settings for one charge controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// IP address or host name of the controller
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Modbus unit / slave id
    #[serde(default = "default_unit_id", alias = "unit")]
    pub unit_id: u8,
    #[serde(default, alias = "base")]
    pub address_base: AddressBase,
    /// Per-operation timeout in seconds
    #[serde(default = "default_timeout_secs", alias = "timeout")]
    pub timeout_secs: f64,
}

fn default_port() -> u16 {
    DEFAULT_MODBUS_PORT
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_secs() -> f64 {
    2.0
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            unit_id: default_unit_id(),
            address_base: AddressBase::default(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_address_base(mut self, base: AddressBase) -> Self {
        self.address_base = base;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Per-operation timeout; saturates instead of overflowing
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(EvcError::config("device IP is not set"));
        }
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(EvcError::config(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout_secs
            )));
        }
        if Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(EvcError::config(format!(
                "timeout of {} seconds is too large",
                self.timeout_secs
            )));
        }
        Ok(())
    }
}
