//! Shared test utilities
//!
//! A scripted in-memory [`Transport`] and a small Modbus TCP device
//! simulator speaking real MBAP frames over a local socket.

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use evc_core::{EvcError, RegisterKind, Result, Transport};

/// One call observed by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read {
        kind: RegisterKind,
        address: u16,
        count: u16,
    },
    Write {
        address: u16,
        value: u16,
    },
    Close,
}

/// In-memory register bank with scripted failures
#[derive(Debug, Default)]
pub struct FakeTransport {
    registers: HashMap<(RegisterKind, u16), u16>,
    read_failures: HashMap<(RegisterKind, u16), EvcError>,
    write_failures: HashMap<u16, EvcError>,
    pub calls: Vec<Call>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bank of a charging three-phase EVC04
    pub fn charging_evc04() -> Self {
        let mut fake = Self::new();
        fake.set_ascii(100, "EVC04-SN-0042");
        fake.set_u32(RegisterKind::Input, 400, 22_000);
        fake.set(RegisterKind::Input, 404, 1);

        fake.set(RegisterKind::Input, 1000, 2);
        fake.set(RegisterKind::Input, 1001, 1);
        fake.set(RegisterKind::Input, 1002, 1);
        fake.set(RegisterKind::Input, 1004, 3);
        fake.set_u32(RegisterKind::Input, 1006, 0);

        fake.set(RegisterKind::Input, 1008, 15_870);
        fake.set(RegisterKind::Input, 1010, 15_920);
        fake.set(RegisterKind::Input, 1012, 15_810);
        fake.set(RegisterKind::Input, 1014, 230);
        fake.set(RegisterKind::Input, 1016, 231);
        fake.set(RegisterKind::Input, 1018, 229);
        fake.set_u32(RegisterKind::Input, 1020, 10_980);
        fake.set_u32(RegisterKind::Input, 1024, 3_650);
        fake.set_u32(RegisterKind::Input, 1028, 3_677);
        fake.set_u32(RegisterKind::Input, 1032, 3_653);
        fake.set_u32(RegisterKind::Input, 1036, 12_345);

        fake.set(RegisterKind::Input, 1100, 16);
        fake.set(RegisterKind::Input, 1102, 6);
        fake.set(RegisterKind::Input, 1104, 32);
        fake.set(RegisterKind::Input, 1106, 20);

        fake.set_u32(RegisterKind::Input, 1502, 7_250);
        fake.set_u32(RegisterKind::Input, 1508, 3_600);

        fake.set(RegisterKind::Holding, 2000, 10);
        fake.set(RegisterKind::Holding, 2002, 60);
        fake.set(RegisterKind::Holding, 5004, 16);
        fake
    }

    pub fn set(&mut self, kind: RegisterKind, address: u16, value: u16) {
        self.registers.insert((kind, address), value);
    }

    pub fn set_u32(&mut self, kind: RegisterKind, address: u16, value: u32) {
        self.set(kind, address, (value >> 16) as u16);
        self.set(kind, address + 1, (value & 0xFFFF) as u16);
    }

    pub fn set_ascii(&mut self, address: u16, text: &str) {
        for (i, pair) in text.as_bytes().chunks(2).enumerate() {
            let word = u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]);
            self.set(RegisterKind::Input, address + i as u16, word);
        }
    }

    pub fn get(&self, kind: RegisterKind, address: u16) -> u16 {
        self.registers.get(&(kind, address)).copied().unwrap_or(0)
    }

    /// Every read starting at `address` fails with `error`
    pub fn fail_read(mut self, kind: RegisterKind, address: u16, error: EvcError) -> Self {
        self.read_failures.insert((kind, address), error);
        self
    }

    /// Every write to `address` fails with `error`
    pub fn fail_write(mut self, address: u16, error: EvcError) -> Self {
        self.write_failures.insert(address, error);
        self
    }

    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Write { address, value } => Some((*address, *value)),
                _ => None,
            })
            .collect()
    }

    pub fn network_calls(&self) -> usize {
        self.calls.iter().filter(|c| !matches!(c, Call::Close)).count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.calls.push(Call::Read {
            kind,
            address,
            count,
        });
        if let Some(err) = self.read_failures.get(&(kind, address)) {
            return Err(err.clone());
        }
        Ok((address..address + count).map(|a| self.get(kind, a)).collect())
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        self.calls.push(Call::Write { address, value });
        if let Some(err) = self.write_failures.get(&address) {
            return Err(err.clone());
        }
        self.set(RegisterKind::Holding, address, value);
        Ok(())
    }

    async fn close(&mut self) {
        self.calls.push(Call::Close);
    }
}

/// Request as seen on the wire by [`DeviceSimulator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireRequest {
    pub unit_id: u8,
    pub function: u8,
    pub address: u16,
    /// Register count for reads, value for writes
    pub operand: u16,
}

#[derive(Debug, Default)]
struct SimState {
    input: Mutex<HashMap<u16, u16>>,
    holding: Mutex<HashMap<u16, u16>>,
    requests: Mutex<Vec<WireRequest>>,
    /// Requests left to swallow without answering
    silent: AtomicUsize,
    /// Requests left to answer only after `reply_delay`
    delayed: AtomicUsize,
    reply_delay: Mutex<Duration>,
    reject_writes: bool,
}

/// Modbus TCP device bound to an ephemeral local port
pub struct DeviceSimulator {
    pub addr: SocketAddr,
    state: Arc<SimState>,
    handle: JoinHandle<()>,
}

impl DeviceSimulator {
    pub async fn start() -> Self {
        Self::start_with(0, false).await
    }

    /// `silent` leading requests get no answer; `reject_writes` answers
    /// every FC06 with a device-failure exception
    pub async fn start_with(silent: usize, reject_writes: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(SimState {
            silent: AtomicUsize::new(silent),
            reject_writes,
            ..SimState::default()
        });

        let accept_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let _ = serve_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Hold back the replies to the next `count` requests by `delay`
    pub fn delay_replies(&self, count: usize, delay: Duration) {
        *self.state.reply_delay.lock().unwrap() = delay;
        self.state.delayed.store(count, Ordering::SeqCst);
    }

    /// Seed an input register at its wire address
    pub fn set_input(&self, address: u16, value: u16) {
        self.state.input.lock().unwrap().insert(address, value);
    }

    pub fn holding(&self, address: u16) -> Option<u16> {
        self.state.holding.lock().unwrap().get(&address).copied()
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for DeviceSimulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(mut stream: TcpStream, state: Arc<SimState>) -> std::io::Result<()> {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).await.is_err() {
            return Ok(());
        }
        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        let mut pdu = vec![0u8; length - 1];
        stream.read_exact(&mut pdu).await?;

        let function = pdu[0];
        let address = u16::from_be_bytes([pdu[1], pdu[2]]);
        let operand = u16::from_be_bytes([pdu[3], pdu[4]]);
        state.requests.lock().unwrap().push(WireRequest {
            unit_id: header[6],
            function,
            address,
            operand,
        });

        let swallowed = state
            .silent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if swallowed {
            continue;
        }
        let held = state
            .delayed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if held {
            let delay = *state.reply_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
        }

        let reply = match function {
            0x03 | 0x04 => {
                let bank = if function == 0x03 {
                    &state.holding
                } else {
                    &state.input
                };
                let bank = bank.lock().unwrap();
                let mut reply = vec![function, (operand * 2) as u8];
                for a in address..address + operand {
                    reply.extend_from_slice(&bank.get(&a).copied().unwrap_or(0).to_be_bytes());
                }
                reply
            },
            0x06 if state.reject_writes => vec![function | 0x80, 0x04],
            0x06 => {
                state.holding.lock().unwrap().insert(address, operand);
                pdu.clone()
            },
            other => vec![other | 0x80, 0x01],
        };

        let mut frame = Vec::with_capacity(7 + reply.len());
        frame.extend_from_slice(&header[0..4]);
        frame.extend_from_slice(&((reply.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&reply);
        stream.write_all(&frame).await?;
    }
}
