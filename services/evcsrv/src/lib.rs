//! Command-line tool and HTTP listener for Vestel EVC04 charge controllers
//!
//! Thin collaborators around [`evc_core`]: layered configuration, logging
//! setup, the `read` / `set-current` / `serve` subcommands and the axum
//! router used by `serve`.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod service;
pub mod shutdown;

pub use api::{router, ApiError, AppState};
pub use bootstrap::{Args, Command};
pub use config::{ConfigLoader, Overrides, VestelSection};
