//! Transport layer
//!
//! [`Transport`] is the seam between the orchestrator and the device. The
//! production implementation speaks Modbus TCP; tests inject a fake.
//!
//! Addresses given to a transport are device-native. The configured
//! [`AddressBase`](crate::config::AddressBase) is applied here, once, so every
//! request of a session uses the same convention.

use std::io::ErrorKind;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::DeviceConfig;
use crate::constants::{MBAP_HEADER_LEN, MODBUS_MAX_READ_REGISTERS};
use crate::error::{EvcError, Result};
use crate::frame::{FrameCodec, MbapHeader, Request, Response};
use crate::register_map::RegisterKind;

/// Register-level access to one controller
#[async_trait]
pub trait Transport: Send {
    /// Read `count` consecutive registers starting at native `address`
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>>;

    /// Write one holding register at native `address`
    async fn write_register(&mut self, address: u16, value: u16) -> Result<()>;

    /// Release the connection; the next operation reconnects
    async fn close(&mut self) {}
}

/// Modbus TCP client for a single controller
///
/// One request in flight at a time. The socket is opened on first use and
/// only kept between requests after a clean exchange. Anything else drops
/// it, a cancelled caller included, so a late reply can never be matched
/// against the next request.
#[derive(Debug)]
pub struct ModbusTcpTransport {
    config: DeviceConfig,
    codec: FrameCodec,
    stream: Option<TcpStream>,
}

impl ModbusTcpTransport {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            codec: FrameCodec::new(),
            stream: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Hand out the open socket, connecting first if there is none
    ///
    /// The caller owns the stream for the length of one exchange, so a
    /// dropped exchange future takes the socket down with it.
    async fn take_stream(&mut self) -> Result<TcpStream> {
        if let Some(stream) = self.stream.take() {
            return Ok(stream);
        }

        let addr = self.config.socket_addr();
        debug!("Connecting to Modbus TCP endpoint: {}", addr);

        let stream = match timeout(self.config.timeout(), TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", addr, e);
                return Err(EvcError::connection(format!(
                    "Failed to connect to {}: {}",
                    addr, e
                )));
            },
            Err(_) => {
                error!("Connection to {} timed out", addr);
                return Err(EvcError::connection(format!(
                    "Connection to {} timed out after {:?}",
                    addr,
                    self.config.timeout()
                )));
            },
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        info!("Connected to {}", addr);
        Ok(stream)
    }

    /// One request/response exchange bounded by the per-operation timeout
    async fn exchange(&mut self, request: &Request) -> Result<Response> {
        let unit_id = self.config.unit_id;
        let op_timeout = self.config.timeout();
        let (transaction_id, frame) = self.codec.encode(unit_id, &request.to_pdu());
        let mut stream = self.take_stream().await?;

        let outcome = timeout(
            op_timeout,
            round_trip(&mut stream, &frame, transaction_id, unit_id, request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(EvcError::timeout(format!(
                "{}: no response within {:?}",
                request.describe(),
                op_timeout
            )))
        });

        // Only a complete reply or an exception leaves the stream in sync
        if matches!(&outcome, Ok(_) | Err(EvcError::RejectedError(_))) {
            self.stream = Some(stream);
        }
        outcome
    }

    /// Exchange with exactly one retry on timeout
    async fn execute(&mut self, request: Request) -> Result<Response> {
        match self.exchange(&request).await {
            Err(err) if err.is_retryable() => {
                warn!("{}, retrying once", err);
                self.exchange(&request).await
            },
            other => other,
        }
    }
}

async fn round_trip(
    stream: &mut TcpStream,
    frame: &[u8],
    transaction_id: u16,
    unit_id: u8,
    request: &Request,
) -> Result<Response> {
    stream.write_all(frame).await.map_err(io_error)?;
    debug!("Sent {}: {} bytes", request.describe(), frame.len());

    let mut header_buf = [0u8; MBAP_HEADER_LEN];
    stream.read_exact(&mut header_buf).await.map_err(io_error)?;
    let header = MbapHeader::parse(&header_buf)?;

    let mut pdu = vec![0u8; header.pdu_len()];
    stream.read_exact(&mut pdu).await.map_err(io_error)?;

    if header.transaction_id != transaction_id {
        return Err(EvcError::protocol(format!(
            "{}: transaction id mismatch, sent {:04X}, got {:04X}",
            request.describe(),
            transaction_id,
            header.transaction_id
        )));
    }
    if header.unit_id != unit_id {
        return Err(EvcError::protocol(format!(
            "{}: unit id mismatch, sent {}, got {}",
            request.describe(),
            unit_id,
            header.unit_id
        )));
    }

    request.parse_response(&pdu)
}

fn io_error(err: std::io::Error) -> EvcError {
    match err.kind() {
        ErrorKind::UnexpectedEof => EvcError::connection("Connection closed by peer"),
        _ => EvcError::connection(format!("TCP I/O error: {}", err)),
    }
}

#[async_trait]
impl Transport for ModbusTcpTransport {
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        if count == 0 || count > MODBUS_MAX_READ_REGISTERS {
            return Err(EvcError::validation(format!(
                "register count {} outside 1..={}",
                count, MODBUS_MAX_READ_REGISTERS
            )));
        }
        let wire_address = self.config.address_base.apply(address)?;
        if wire_address.checked_add(count - 1).is_none() {
            return Err(EvcError::validation(format!(
                "{} {} x{} runs past the end of the address space",
                kind, address, count
            )));
        }

        let request = Request::ReadRegisters {
            kind,
            address: wire_address,
            count,
        };
        match self.execute(request).await? {
            Response::Registers(words) => Ok(words),
            other => Err(EvcError::protocol(format!(
                "{}: unexpected response {:?}",
                request.describe(),
                other
            ))),
        }
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        let wire_address = self.config.address_base.apply(address)?;
        let request = Request::WriteSingleRegister {
            address: wire_address,
            value,
        };
        match self.execute(request).await? {
            Response::WriteAck { .. } => Ok(()),
            other => Err(EvcError::protocol(format!(
                "{}: unexpected response {:?}",
                request.describe(),
                other
            ))),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error while closing connection: {}", e);
            }
            debug!("Closed connection to {}", self.config.socket_addr());
        }
    }
}
