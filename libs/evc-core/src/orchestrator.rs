//! Poll and write orchestration
//!
//! Sequences register map batches through a [`Transport`], one request at a
//! time, and turns the results into a [`DeviceSnapshot`]. Writes are planned
//! and validated in full before the first byte goes out.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::decoder::{decode, encode, Value};
use crate::error::{EvcError, Result};
use crate::register_map::{
    FieldId, Group, RegisterBatch, RegisterField, RegisterKind, RegisterMap, VESTEL_EVC04,
};
use crate::snapshot::{DeviceSnapshot, SnapshotBuilder};
use crate::transport::Transport;

/// Which current limit a write applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrentTarget {
    Dynamic,
    Failsafe,
    Both,
}

impl CurrentTarget {
    /// Register map entries written, in write order
    fn steps(self) -> &'static [(CurrentTarget, FieldId)] {
        match self {
            CurrentTarget::Dynamic => &[(CurrentTarget::Dynamic, FieldId::DynamicCurrent)],
            CurrentTarget::Failsafe => &[(CurrentTarget::Failsafe, FieldId::FailsafeCurrent)],
            CurrentTarget::Both => &[
                (CurrentTarget::Dynamic, FieldId::DynamicCurrent),
                (CurrentTarget::Failsafe, FieldId::FailsafeCurrent),
            ],
        }
    }
}

impl fmt::Display for CurrentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentTarget::Dynamic => write!(f, "dynamic"),
            CurrentTarget::Failsafe => write!(f, "failsafe"),
            CurrentTarget::Both => write!(f, "both"),
        }
    }
}

impl FromStr for CurrentTarget {
    type Err = EvcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dynamic" => Ok(CurrentTarget::Dynamic),
            "failsafe" => Ok(CurrentTarget::Failsafe),
            "both" => Ok(CurrentTarget::Both),
            other => Err(EvcError::validation(format!(
                "unknown current target '{}', expected dynamic, failsafe or both",
                other
            ))),
        }
    }
}

/// A validated current-limit change
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub target: CurrentTarget,
    pub amperes: u16,
    steps: Vec<WriteStep>,
}

#[derive(Debug, Clone, Copy)]
struct WriteStep {
    target: CurrentTarget,
    field: &'static RegisterField,
    word: u16,
}

impl WriteRequest {
    /// Check `amperes` against every target field's declared range
    pub fn plan(map: &'static RegisterMap, target: CurrentTarget, amperes: i32) -> Result<Self> {
        let mut steps = Vec::new();
        for &(step_target, id) in target.steps() {
            let field = map
                .field(id)
                .ok_or_else(|| EvcError::validation(format!("{:?} is not in the register map", id)))?;
            let Some((min, max)) = field.valid_range.filter(|_| field.is_writable()) else {
                return Err(EvcError::validation(format!("{:?} is not writable", id)));
            };
            if amperes < i32::from(min) || amperes > i32::from(max) {
                return Err(EvcError::validation(format!(
                    "{} current {} A outside valid range {}..={} A",
                    step_target, amperes, min, max
                )));
            }
            let word = match encode(field, &Value::U32(amperes as u32))?.as_slice() {
                [word] => *word,
                words => {
                    return Err(EvcError::validation(format!(
                        "{:?} encodes to {} registers, expected 1",
                        id,
                        words.len()
                    )))
                },
            };
            steps.push(WriteStep {
                target: step_target,
                field,
                word,
            });
        }

        Ok(Self {
            target,
            amperes: amperes as u16,
            steps,
        })
    }

    /// Holding register addresses in write order
    pub fn addresses(&self) -> Vec<u16> {
        self.steps.iter().map(|s| s.field.address).collect()
    }
}

/// Value read back from one written register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadBack {
    pub target: CurrentTarget,
    pub address: u16,
    /// `None` when the read-back itself failed
    pub value: Option<u16>,
}

/// Outcome of a fully applied write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub target: CurrentTarget,
    pub amperes: u16,
    pub applied: Vec<CurrentTarget>,
    pub readback: Vec<ReadBack>,
}

impl WriteReport {
    pub fn readback_for(&self, target: CurrentTarget) -> Option<u16> {
        self.readback
            .iter()
            .find(|r| r.target == target)
            .and_then(|r| r.value)
    }
}

/// Drives polls and writes against one controller
pub struct Orchestrator<T: Transport> {
    transport: T,
    map: &'static RegisterMap,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self::with_map(transport, &VESTEL_EVC04)
    }

    pub fn with_map(transport: T, map: &'static RegisterMap) -> Self {
        Self { transport, map }
    }

    pub fn map(&self) -> &'static RegisterMap {
        self.map
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Read every group into a fresh snapshot
    ///
    /// A failed batch leaves its fields absent and is listed in
    /// [`DeviceSnapshot::failures`]. Only a connection failure aborts the
    /// whole poll.
    pub async fn poll(&mut self) -> Result<DeviceSnapshot> {
        let result = self.run_poll(None).await;
        self.transport.close().await;
        result
    }

    /// Like [`poll`](Self::poll), but stop issuing requests once `budget`
    /// has elapsed and return whatever was decoded so far
    pub async fn poll_within(&mut self, budget: Duration) -> Result<DeviceSnapshot> {
        let result = self.run_poll(Instant::now().checked_add(budget)).await;
        self.transport.close().await;
        result
    }

    async fn run_poll(&mut self, deadline: Option<Instant>) -> Result<DeviceSnapshot> {
        let mut builder = SnapshotBuilder::new();
        let batches = self.map.batches_for(&Group::ALL);
        debug!("Polling {} in {} batches", self.map.model, batches.len());

        for batch in &batches {
            let read = self.transport.read_registers(batch.kind, batch.start, batch.count);
            let result = match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    Err(EvcError::timeout("poll deadline reached before request"))
                },
                Some(deadline) => timeout_at(deadline, read)
                    .await
                    .unwrap_or_else(|_| Err(EvcError::timeout("poll deadline reached"))),
                None => read.await,
            };

            match result.and_then(|words| decode_batch(batch, &words)) {
                Ok(values) => {
                    for (id, value) in values {
                        builder.insert(id, value);
                    }
                },
                Err(err) if err.is_fatal_for_pass() => return Err(err),
                Err(err) => {
                    warn!("Batch {} failed: {}", batch.label(), err);
                    builder.record_failure(batch, err);
                },
            }
        }

        Ok(builder.build())
    }

    /// Validate, write, then read back the written registers
    ///
    /// Nothing is sent when validation fails. For [`CurrentTarget::Both`]
    /// the dynamic limit is written first; a failure on the failsafe write
    /// is reported as [`EvcError::PartialWrite`].
    pub async fn set_current(&mut self, target: CurrentTarget, amperes: i32) -> Result<WriteReport> {
        let request = WriteRequest::plan(self.map, target, amperes)?;
        let result = self.apply(&request).await;
        self.transport.close().await;
        result
    }

    async fn apply(&mut self, request: &WriteRequest) -> Result<WriteReport> {
        let mut applied = Vec::new();
        for step in &request.steps {
            match self
                .transport
                .write_register(step.field.address, step.word)
                .await
            {
                Ok(()) => {
                    info!(
                        "Set {} current to {} A (holding {})",
                        step.target, request.amperes, step.field.address
                    );
                    applied.push(step.target);
                },
                Err(err) if applied.is_empty() => return Err(err),
                Err(err) => {
                    warn!(
                        "{} current write failed after {:?} was applied: {}",
                        step.target, applied, err
                    );
                    return Err(EvcError::PartialWrite {
                        applied,
                        failed: step.target,
                        source: Box::new(err),
                    });
                },
            }
        }

        let mut readback = Vec::with_capacity(request.steps.len());
        for step in &request.steps {
            let value = self.read_back(step.field).await;
            readback.push(ReadBack {
                target: step.target,
                address: step.field.address,
                value,
            });
        }

        Ok(WriteReport {
            target: request.target,
            amperes: request.amperes,
            applied,
            readback,
        })
    }

    async fn read_back(&mut self, field: &'static RegisterField) -> Option<u16> {
        let result = self
            .transport
            .read_registers(RegisterKind::Holding, field.address, field.count)
            .await
            .and_then(|words| decode(field, &words));
        match result {
            Ok(value) => value.as_u16(),
            Err(err) => {
                warn!("Read-back of {:?} failed: {}", field.id, err);
                None
            },
        }
    }
}

/// Decode every field of a batch; any failure blanks the whole batch
fn decode_batch(batch: &RegisterBatch<'_>, words: &[u16]) -> Result<Vec<(FieldId, Value)>> {
    if words.len() != usize::from(batch.count) {
        return Err(EvcError::decode(format!(
            "{}: expected {} registers, got {}",
            batch.label(),
            batch.count,
            words.len()
        )));
    }
    batch
        .fields
        .iter()
        .map(|field| {
            let slice = batch.words_for(field, words).ok_or_else(|| {
                EvcError::decode(format!("{:?} lies outside {}", field.id, batch.label()))
            })?;
            Ok((field.id, decode(field, slice)?))
        })
        .collect()
}
