//! In-memory controller shared between a test and the router under test

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use evc_core::{EvcError, RegisterKind, Result, Transport};

#[derive(Default)]
struct Registers {
    input: HashMap<u16, u16>,
    holding: HashMap<u16, u16>,
    writes: Vec<(u16, u16)>,
    unreachable: bool,
    reject_writes_to: Option<u16>,
}

/// Cloneable handle; clones see the same registers
#[derive(Clone, Default)]
pub struct FakeDevice {
    inner: Arc<Mutex<Registers>>,
}

impl FakeDevice {
    /// Charging at ~16 A with the limits at their defaults
    pub fn charging() -> Self {
        let device = Self::default();
        {
            let mut regs = device.inner.lock().unwrap();
            for (i, chunk) in b"EVC04-TEST".chunks(2).enumerate() {
                let hi = u16::from(chunk[0]) << 8;
                let lo = chunk.get(1).copied().map_or(0, u16::from);
                regs.input.insert(100 + i as u16, hi | lo);
            }
            regs.input.insert(401, 22000);
            regs.input.insert(404, 1);
            regs.input.insert(1000, 2);
            regs.input.insert(1001, 1);
            regs.input.insert(1002, 1);
            regs.input.insert(1004, 3);
            regs.input.insert(1008, 16000);
            regs.input.insert(1014, 230);
            regs.input.insert(1021, 3680);
            regs.holding.insert(2000, 10);
            regs.holding.insert(2002, 60);
            regs.holding.insert(5004, 16);
        }
        device
    }

    pub fn unreachable(self) -> Self {
        self.inner.lock().unwrap().unreachable = true;
        self
    }

    pub fn reject_writes_to(self, address: u16) -> Self {
        self.inner.lock().unwrap().reject_writes_to = Some(address);
        self
    }

    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn holding(&self, address: u16) -> Option<u16> {
        self.inner.lock().unwrap().holding.get(&address).copied()
    }
}

#[async_trait]
impl Transport for FakeDevice {
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        let regs = self.inner.lock().unwrap();
        if regs.unreachable {
            return Err(EvcError::connection("Connection refused"));
        }
        let table = match kind {
            RegisterKind::Input => &regs.input,
            RegisterKind::Holding => &regs.holding,
        };
        Ok((address..address + count)
            .map(|a| table.get(&a).copied().unwrap_or(0))
            .collect())
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        let mut regs = self.inner.lock().unwrap();
        if regs.unreachable {
            return Err(EvcError::connection("Connection refused"));
        }
        if regs.reject_writes_to == Some(address) {
            return Err(EvcError::rejected(format!(
                "write {} rejected: Illegal data value",
                address
            )));
        }
        regs.writes.push((address, value));
        regs.holding.insert(address, value);
        Ok(())
    }
}
