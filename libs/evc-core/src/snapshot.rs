//! Device snapshot
//!
//! The result of one poll. Every value is optional: a field is `None` when
//! the batch carrying it failed during this poll, never a value left over
//! from an earlier one.

use std::collections::HashMap;

use crate::decoder::{EnumValue, Value};
use crate::error::EvcError;
use crate::register_map::{FieldId, Group, RegisterBatch};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub serial: Option<String>,
    pub max_power_w: Option<u32>,
    pub phases: Option<EnumValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct States {
    pub chargepoint: Option<EnumValue>,
    pub charging: Option<EnumValue>,
    pub equipment: Option<EnumValue>,
    pub cable: Option<EnumValue>,
    pub fault_code: Option<u32>,
}

/// One value per phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseValues<T> {
    pub l1: Option<T>,
    pub l2: Option<T>,
    pub l3: Option<T>,
}

impl<T> Default for PhaseValues<T> {
    fn default() -> Self {
        Self {
            l1: None,
            l2: None,
            l3: None,
        }
    }
}

impl<T: Copy> PhaseValues<T> {
    /// `(phase number, value)` pairs, 1-based
    pub fn iter(&self) -> impl Iterator<Item = (u8, Option<T>)> {
        [(1, self.l1), (2, self.l2), (3, self.l3)].into_iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Electrical {
    pub current_a: PhaseValues<f64>,
    pub voltage_v: PhaseValues<u16>,
    pub power_w: PhaseValues<u32>,
    pub total_power_w: Option<u32>,
    pub meter_reading_kwh: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub energy_wh: Option<u32>,
    pub duration_s: Option<u32>,
    pub max_current_a: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Limits {
    pub evse_min_a: Option<u16>,
    pub evse_max_a: Option<u16>,
    pub cable_max_a: Option<u16>,
    pub dynamic_current_a: Option<u16>,
    pub failsafe_current_a: Option<u16>,
    pub failsafe_timeout_s: Option<u16>,
}

/// A batch that contributed nothing to the snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub group: Group,
    /// Location of the batch, e.g. `electrical input 1008..=1037`
    pub batch: String,
    pub error: EvcError,
}

/// Immutable result of one full poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub identity: Identity,
    pub states: States,
    pub electrical: Electrical,
    pub session: Session,
    pub limits: Limits,
    pub failures: Vec<BatchFailure>,
}

impl DeviceSnapshot {
    /// True when every batch was read and decoded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self.failures.iter().map(|f| f.group).collect();
        groups.sort();
        groups.dedup();
        groups
    }
}

/// Accumulates decoded values while a poll is in progress
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    values: HashMap<FieldId, Value>,
    failures: Vec<BatchFailure>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: FieldId, value: Value) {
        self.values.insert(id, value);
    }

    pub fn record_failure(&mut self, batch: &RegisterBatch<'_>, error: EvcError) {
        self.failures.push(BatchFailure {
            group: batch.group,
            batch: batch.label(),
            error,
        });
    }

    fn u16_of(&self, id: FieldId) -> Option<u16> {
        self.values.get(&id).and_then(Value::as_u16)
    }

    fn u32_of(&self, id: FieldId) -> Option<u32> {
        self.values.get(&id).and_then(Value::as_u32)
    }

    fn f64_of(&self, id: FieldId) -> Option<f64> {
        self.values.get(&id).and_then(Value::as_f64)
    }

    fn enum_of(&self, id: FieldId) -> Option<EnumValue> {
        self.values.get(&id).and_then(Value::as_enum).cloned()
    }

    fn text_of(&self, id: FieldId) -> Option<String> {
        self.values.get(&id).and_then(Value::as_text).map(str::to_string)
    }

    pub fn build(self) -> DeviceSnapshot {
        use FieldId::*;

        DeviceSnapshot {
            identity: Identity {
                serial: self.text_of(Serial),
                max_power_w: self.u32_of(MaxPower),
                phases: self.enum_of(Phases),
            },
            states: States {
                chargepoint: self.enum_of(ChargepointState),
                charging: self.enum_of(ChargingState),
                equipment: self.enum_of(EquipmentState),
                cable: self.enum_of(CableState),
                fault_code: self.u32_of(FaultCode),
            },
            electrical: Electrical {
                current_a: PhaseValues {
                    l1: self.f64_of(CurrentL1),
                    l2: self.f64_of(CurrentL2),
                    l3: self.f64_of(CurrentL3),
                },
                voltage_v: PhaseValues {
                    l1: self.u16_of(VoltageL1),
                    l2: self.u16_of(VoltageL2),
                    l3: self.u16_of(VoltageL3),
                },
                power_w: PhaseValues {
                    l1: self.u32_of(PowerL1),
                    l2: self.u32_of(PowerL2),
                    l3: self.u32_of(PowerL3),
                },
                total_power_w: self.u32_of(TotalPower),
                meter_reading_kwh: self.f64_of(MeterReading),
            },
            session: Session {
                energy_wh: self.u32_of(SessionEnergy),
                duration_s: self.u32_of(SessionDuration),
                max_current_a: self.u16_of(SessionMaxCurrent),
            },
            limits: Limits {
                evse_min_a: self.u16_of(EvseMinCurrent),
                evse_max_a: self.u16_of(EvseMaxCurrent),
                cable_max_a: self.u16_of(CableMaxCurrent),
                dynamic_current_a: self.u16_of(DynamicCurrent),
                failsafe_current_a: self.u16_of(FailsafeCurrent),
                failsafe_timeout_s: self.u16_of(FailsafeTimeout),
            },
            failures: self.failures,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::register_map::{CHARGEPOINT_STATE, VESTEL_EVC04};

    #[test]
    fn test_empty_builder_yields_all_absent() {
        let snapshot = SnapshotBuilder::new().build();
        assert_eq!(snapshot, DeviceSnapshot::default());
        assert!(snapshot.is_complete());
    }

    #[test]
    fn test_values_land_in_their_sections() {
        let mut builder = SnapshotBuilder::new();
        builder.insert(FieldId::Serial, Value::Text("EVC04".into()));
        builder.insert(FieldId::CurrentL2, Value::Scaled(15.87));
        builder.insert(FieldId::VoltageL3, Value::U16(231));
        builder.insert(
            FieldId::ChargepointState,
            Value::Enum(EnumValue::resolve(&CHARGEPOINT_STATE, 2)),
        );
        builder.insert(FieldId::DynamicCurrent, Value::U16(16));
        let snapshot = builder.build();

        assert_eq!(snapshot.identity.serial.as_deref(), Some("EVC04"));
        assert_eq!(snapshot.electrical.current_a.l2, Some(15.87));
        assert_eq!(snapshot.electrical.current_a.l1, None);
        assert_eq!(snapshot.electrical.voltage_v.l3, Some(231));
        assert_eq!(snapshot.states.chargepoint.unwrap().label, "Charging");
        assert_eq!(snapshot.limits.dynamic_current_a, Some(16));
        assert_eq!(snapshot.limits.failsafe_current_a, None);
    }

    #[test]
    fn test_failures_are_kept() {
        let batches = VESTEL_EVC04.batches_for(&[Group::Electrical]);
        let mut builder = SnapshotBuilder::new();
        builder.record_failure(&batches[0], EvcError::timeout("read input 1008 x30"));
        let snapshot = builder.build();

        assert!(!snapshot.is_complete());
        assert_eq!(snapshot.failed_groups(), vec![Group::Electrical]);
        assert_eq!(snapshot.failures[0].batch, "electrical input 1008..=1037");
    }

    #[test]
    fn test_phase_iteration_is_numbered() {
        let phases = PhaseValues {
            l1: Some(230u16),
            l2: None,
            l3: Some(229),
        };
        let collected: Vec<_> = phases.iter().collect();
        assert_eq!(collected, vec![(1, Some(230)), (2, None), (3, Some(229))]);
    }
}
