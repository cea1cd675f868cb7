//! Vestel EVC04 charge controller engine
//!
//! Polls and controls a Vestel EVC04 EV charge controller over Modbus TCP.
//! The crate knows which registers exist, how multi-register values are
//! composed, how reads are batched and how current-limit writes are
//! validated before they are sent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  RegisterMap    │───►│  Orchestrator   │───►│    Renderer     │
//! │ (static table)  │    │ (poll / write)  │    │ human/json/prom │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!                          │            ▲
//!                          ▼            │
//!                 ┌─────────────────┐  ┌─────────────────┐
//!                 │   Transport     │─►│    Decoder      │
//!                 │  (Modbus TCP)   │  │ (words → value) │
//!                 └─────────────────┘  └─────────────────┘
//! ```
//!
//! - **`register_map`**: declarative vendor table and batch planning
//! - **`transport`**: the [`Transport`] trait and the Modbus TCP client
//! - **`decoder`**: register words to typed values and back
//! - **`orchestrator`**: full polls with partial-result policy, validated writes
//! - **`render`**: snapshot to human text, JSON or Prometheus exposition
//!
//! # Quick Start
//!
//! ```no_run
//! use evc_core::{DeviceConfig, ModbusTcpTransport, Orchestrator, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> evc_core::Result<()> {
//!     let config = DeviceConfig::new("192.168.1.50");
//!     config.validate()?;
//!
//!     let mut orchestrator = Orchestrator::new(ModbusTcpTransport::new(config));
//!     let snapshot = orchestrator.poll().await?;
//!     println!("{}", evc_core::render(&snapshot, OutputFormat::Json));
//!     Ok(())
//! }
//! ```
//!
//! The engine never touches ambient state: configuration is passed in, one
//! poll or write runs at a time per transport, and callers that share a
//! transport across tasks must serialize access themselves.

pub mod config;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod orchestrator;
pub mod register_map;
pub mod render;
pub mod snapshot;
pub mod transport;

pub use config::{AddressBase, DeviceConfig};
pub use decoder::{decode, encode, EnumValue, Value};
pub use error::{EvcError, Result};
pub use orchestrator::{CurrentTarget, Orchestrator, ReadBack, WriteReport, WriteRequest};
pub use register_map::{
    FieldId, Group, RegisterBatch, RegisterField, RegisterKind, RegisterMap, VESTEL_EVC04,
};
pub use render::{render, to_human, to_json, to_json_value, to_prometheus, OutputFormat};
pub use snapshot::DeviceSnapshot;
pub use transport::{ModbusTcpTransport, Transport};
