//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use evc_core::{CurrentTarget, OutputFormat};

use crate::config::{ConfigLoader, Overrides};
use crate::logging::LogConfig;

/// Read and control a Vestel EVC04 charge controller over Modbus TCP
#[derive(Debug, Clone, Parser)]
#[command(name = "evcsrv", author, version, about)]
pub struct Args {
    /// TOML file with a [vestel] section
    #[arg(short = 'c', long, env = "EVC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Controller IP address or host name
    #[arg(long, global = true)]
    pub ip: Option<String>,

    /// Modbus TCP port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Modbus unit id
    #[arg(long, global = true)]
    pub unit: Option<u8>,

    /// Address base (0 or 1)
    #[arg(long, global = true)]
    pub base: Option<u8>,

    /// Per-operation timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<f64>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    pub log_level: String,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Poll the controller once and print the snapshot
    Read {
        #[arg(short, long, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
    /// Change the charging current limit, then print a fresh snapshot
    SetCurrent {
        /// Current in amperes
        #[arg(allow_negative_numbers = true)]
        amperes: i32,

        /// dynamic, failsafe or both
        #[arg(short, long, default_value_t = CurrentTarget::Both)]
        target: CurrentTarget,

        #[arg(short, long, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },
    /// Serve status, metrics and current control over HTTP
    Serve {
        #[arg(short, long, default_value = "0.0.0.0:5000", env = "EVC_BIND")]
        bind: String,
    },
}

impl Args {
    /// Subcommand to run; `read` when none was given
    pub fn action(&self) -> Command {
        self.command.clone().unwrap_or(Command::Read {
            format: OutputFormat::Human,
        })
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            ip: self.ip.clone(),
            port: self.port,
            unit: self.unit,
            base: self.base,
            timeout: self.timeout,
        }
    }

    pub fn config_loader(&self) -> ConfigLoader {
        ConfigLoader::new()
            .with_file(self.config.clone())
            .with_overrides(self.overrides())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            ansi: !self.no_color,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_read_is_default() {
        let args = Args::try_parse_from(["evcsrv", "--ip", "10.0.0.7"]).unwrap();
        assert_eq!(
            args.action(),
            Command::Read {
                format: OutputFormat::Human
            }
        );
        assert_eq!(args.overrides().ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(args.overrides().port, None);
    }

    #[test]
    fn test_set_current_defaults_to_both() {
        let args = Args::try_parse_from(["evcsrv", "set-current", "16", "--format", "json"]).unwrap();
        assert_eq!(
            args.action(),
            Command::SetCurrent {
                amperes: 16,
                target: CurrentTarget::Both,
                format: OutputFormat::Json,
            }
        );
    }

    #[test]
    fn test_negative_current_reaches_validation() {
        let args =
            Args::try_parse_from(["evcsrv", "set-current", "-5", "--target", "dynamic"]).unwrap();
        assert!(matches!(
            args.action(),
            Command::SetCurrent {
                amperes: -5,
                target: CurrentTarget::Dynamic,
                ..
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "evcsrv", "read", "--format", "prometheus", "--ip", "10.0.0.8", "--base", "1",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(args.overrides().base, Some(1));
        assert!(!args.log_config().ansi);
        assert_eq!(
            args.action(),
            Command::Read {
                format: OutputFormat::Prometheus
            }
        );
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        assert!(Args::try_parse_from(["evcsrv", "set-current", "16", "--target", "max"]).is_err());
    }
}
