//! Snapshot renderers
//!
//! Pure and total: every [`DeviceSnapshot`], including one with every value
//! absent, renders without error.

mod exposition;
mod human;
mod json;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EvcError, Result};
use crate::snapshot::DeviceSnapshot;

pub use exposition::to_prometheus;
pub use human::to_human;
pub use json::{to_json, to_json_value};

/// Output representation of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Prometheus,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Human => "text/plain; charset=utf-8",
            OutputFormat::Json => "application/json",
            OutputFormat::Prometheus => "text/plain; version=0.0.4; charset=utf-8",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Prometheus => write!(f, "prometheus"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EvcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "prometheus" | "prom" => Ok(OutputFormat::Prometheus),
            other => Err(EvcError::validation(format!(
                "unknown output format '{}', expected human, json or prometheus",
                other
            ))),
        }
    }
}

/// Render `snapshot` in `format`
pub fn render(snapshot: &DeviceSnapshot, format: OutputFormat) -> String {
    match format {
        OutputFormat::Human => to_human(snapshot),
        OutputFormat::Json => to_json(snapshot),
        OutputFormat::Prometheus => to_prometheus(snapshot),
    }
}

/// Round half away from zero to `decimals` places
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
