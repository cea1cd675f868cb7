//! Vestel EVC04 register catalog
//!
//! The vendor table is data: every readable or writable value is one
//! [`RegisterField`] row in [`VESTEL_EVC04`]. Corrections and additions are
//! edits to the table, not to the decoding or orchestration code.
//!
//! Batching groups fields into address windows so a full snapshot costs a
//! handful of round trips instead of one request per value. A batch never
//! spans two [`Group`]s, which keeps a failed window from blanking
//! unrelated parts of the snapshot.

use std::fmt;

use serde::Serialize;

use crate::constants::{MAX_BATCH_GAP, MODBUS_MAX_READ_REGISTERS};

/// Modbus register table a field lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Read-only measurements and identity (FC04)
    Input,
    /// Read/write settings (FC03 / FC06)
    Holding,
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterKind::Input => write!(f, "input"),
            RegisterKind::Holding => write!(f, "holding"),
        }
    }
}

/// How raw register words turn into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Uint16,
    Int16,
    /// High word first
    Uint32Be,
    /// Two characters per word, high byte first
    AsciiPacked { chars: u16 },
    /// Raw uint16 divided by `divisor` (e.g. milliamps to amps)
    ScaledUint16 { divisor: u16 },
    /// Raw high-word-first uint32 divided by `divisor`
    ScaledUint32Be { divisor: u32 },
}

impl Encoding {
    /// Number of registers the encoding occupies
    pub const fn register_count(&self) -> u16 {
        match self {
            Encoding::Uint16 | Encoding::Int16 | Encoding::ScaledUint16 { .. } => 1,
            Encoding::Uint32Be | Encoding::ScaledUint32Be { .. } => 2,
            Encoding::AsciiPacked { chars } => chars.div_ceil(2),
        }
    }

    /// Whether the decoded value is an integer usable as an enum code
    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            Encoding::Uint16 | Encoding::Int16 | Encoding::Uint32Be
        )
    }
}

/// Fixed code → label mapping for state registers
#[derive(Debug)]
pub struct EnumTable {
    pub name: &'static str,
    entries: &'static [(u32, &'static str)],
}

impl EnumTable {
    pub const fn new(name: &'static str, entries: &'static [(u32, &'static str)]) -> Self {
        Self { name, entries }
    }

    /// Label for `code`, `None` for codes the table does not know
    pub fn label(&self, code: u32) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, label)| *label)
    }

    pub fn entries(&self) -> &'static [(u32, &'static str)] {
        self.entries
    }
}

pub static CHARGEPOINT_STATE: EnumTable = EnumTable::new(
    "chargepoint_state",
    &[
        (0, "Available"),
        (1, "Preparing"),
        (2, "Charging"),
        (3, "SuspendedEVSE"),
        (4, "SuspendedEV"),
        (5, "Finishing"),
        (6, "Reserved"),
        (7, "Unavailable"),
        (8, "Faulted"),
    ],
);

pub static CHARGING_STATE: EnumTable =
    EnumTable::new("charging_state", &[(0, "NotCharging"), (1, "Charging")]);

pub static EQUIPMENT_STATE: EnumTable = EnumTable::new(
    "equipment_state",
    &[
        (0, "Initializing"),
        (1, "Running"),
        (2, "Fault"),
        (3, "Disabled"),
        (4, "Updating"),
    ],
);

pub static CABLE_STATE: EnumTable = EnumTable::new(
    "cable_state",
    &[
        (0, "CableNotConnected"),
        (1, "CableConnected_NoVehicle"),
        (2, "CableConnected_Vehicle"),
        (3, "CableConnected_VehicleLocked"),
    ],
);

pub static PHASES: EnumTable = EnumTable::new("phases", &[(0, "1-phase"), (1, "3-phase")]);

/// Snapshot section a field belongs to; also the unit of batch isolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Identity,
    States,
    Electrical,
    Limits,
    Session,
    Settings,
}

impl Group {
    pub const ALL: [Group; 6] = [
        Group::Identity,
        Group::States,
        Group::Electrical,
        Group::Limits,
        Group::Session,
        Group::Settings,
    ];
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Group::Identity => "identity",
            Group::States => "states",
            Group::Electrical => "electrical",
            Group::Limits => "limits",
            Group::Session => "session",
            Group::Settings => "settings",
        };
        f.write_str(name)
    }
}

/// Every logical value the controller exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    Serial,
    MaxPower,
    Phases,
    ChargepointState,
    ChargingState,
    EquipmentState,
    CableState,
    FaultCode,
    CurrentL1,
    CurrentL2,
    CurrentL3,
    VoltageL1,
    VoltageL2,
    VoltageL3,
    TotalPower,
    PowerL1,
    PowerL2,
    PowerL3,
    MeterReading,
    SessionMaxCurrent,
    EvseMinCurrent,
    EvseMaxCurrent,
    CableMaxCurrent,
    SessionEnergy,
    SessionDuration,
    FailsafeCurrent,
    FailsafeTimeout,
    DynamicCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

/// One logical value in the vendor table
#[derive(Debug, Clone, Copy)]
pub struct RegisterField {
    pub id: FieldId,
    pub group: Group,
    pub kind: RegisterKind,
    /// Device-native, base-0 address
    pub address: u16,
    pub count: u16,
    pub encoding: Encoding,
    pub enum_table: Option<&'static EnumTable>,
    pub unit: Option<&'static str>,
    pub access: Access,
    /// Inclusive range accepted for writes
    pub valid_range: Option<(u16, u16)>,
}

impl RegisterField {
    pub const fn input(id: FieldId, group: Group, address: u16, encoding: Encoding) -> Self {
        Self {
            id,
            group,
            kind: RegisterKind::Input,
            address,
            count: encoding.register_count(),
            encoding,
            enum_table: None,
            unit: None,
            access: Access::Read,
            valid_range: None,
        }
    }

    pub const fn holding(id: FieldId, group: Group, address: u16, encoding: Encoding) -> Self {
        Self {
            kind: RegisterKind::Holding,
            ..Self::input(id, group, address, encoding)
        }
    }

    pub const fn with_unit(self, unit: &'static str) -> Self {
        Self {
            unit: Some(unit),
            ..self
        }
    }

    pub const fn with_enum(self, table: &'static EnumTable) -> Self {
        Self {
            enum_table: Some(table),
            ..self
        }
    }

    pub const fn writable(self, min: u16, max: u16) -> Self {
        Self {
            access: Access::ReadWrite,
            valid_range: Some((min, max)),
            ..self
        }
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    /// Last address covered by the field
    pub fn end(&self) -> u16 {
        self.address + self.count.saturating_sub(1)
    }

    /// Register count and encoding agree, scaling has a usable divisor and
    /// enum tables only sit on integer encodings
    pub fn is_consistent(&self) -> bool {
        let scaled_ok = match self.encoding {
            Encoding::ScaledUint16 { divisor } => divisor != 0,
            Encoding::ScaledUint32Be { divisor } => divisor != 0,
            _ => true,
        };
        let enum_ok = self.enum_table.is_none() || self.encoding.is_integral();
        let write_ok = match (self.access, self.valid_range) {
            (Access::ReadWrite, Some((min, max))) => {
                min <= max && self.kind == RegisterKind::Holding && self.count == 1
            },
            (Access::ReadWrite, None) => false,
            (Access::Read, _) => true,
        };
        self.count == self.encoding.register_count() && scaled_ok && enum_ok && write_ok
    }
}

/// Contiguous read window covering one or more fields of one group
#[derive(Debug, Clone)]
pub struct RegisterBatch<'m> {
    pub group: Group,
    pub kind: RegisterKind,
    pub start: u16,
    pub count: u16,
    pub fields: Vec<&'m RegisterField>,
}

impl<'m> RegisterBatch<'m> {
    fn open(field: &'m RegisterField) -> Self {
        Self {
            group: field.group,
            kind: field.kind,
            start: field.address,
            count: field.count,
            fields: vec![field],
        }
    }

    /// Extend the window to `field` if it stays within the gap and size limits
    fn try_extend(&mut self, field: &'m RegisterField) -> bool {
        if field.kind != self.kind || field.group != self.group {
            return false;
        }
        let end = self.start + self.count;
        if field.address < end || field.address - end > MAX_BATCH_GAP {
            return false;
        }
        let new_count = field.address + field.count - self.start;
        if new_count > MODBUS_MAX_READ_REGISTERS {
            return false;
        }
        self.count = new_count;
        self.fields.push(field);
        true
    }

    /// Words belonging to `field` out of the batch response
    pub fn words_for<'w>(&self, field: &RegisterField, words: &'w [u16]) -> Option<&'w [u16]> {
        let offset = usize::from(field.address.checked_sub(self.start)?);
        words.get(offset..offset + usize::from(field.count))
    }

    pub fn end(&self) -> u16 {
        self.start + self.count.saturating_sub(1)
    }

    /// Human-readable location used in logs and error context
    pub fn label(&self) -> String {
        format!("{} {} {}..={}", self.group, self.kind, self.start, self.end())
    }
}

/// A full register catalog for one device model
#[derive(Debug)]
pub struct RegisterMap {
    pub model: &'static str,
    fields: &'static [RegisterField],
}

impl RegisterMap {
    pub const fn new(model: &'static str, fields: &'static [RegisterField]) -> Self {
        Self { model, fields }
    }

    pub fn fields(&self) -> &'static [RegisterField] {
        self.fields
    }

    pub fn field(&self, id: FieldId) -> Option<&'static RegisterField> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// Fields of `group`, ordered by register table then address
    pub fn fields_for(&self, group: Group) -> Vec<&'static RegisterField> {
        let mut fields: Vec<_> = self.fields.iter().filter(|f| f.group == group).collect();
        fields.sort_by_key(|f| (f.kind, f.address));
        fields
    }

    /// Partition the fields of `groups` into size-bounded read windows,
    /// in the order the groups are given
    pub fn batches_for(&self, groups: &[Group]) -> Vec<RegisterBatch<'static>> {
        let mut batches = Vec::new();
        for &group in groups {
            let mut current: Option<RegisterBatch<'static>> = None;
            for field in self.fields_for(group) {
                let extended = current
                    .as_mut()
                    .is_some_and(|batch| batch.try_extend(field));
                if !extended {
                    if let Some(done) = current.replace(RegisterBatch::open(field)) {
                        batches.push(done);
                    }
                }
            }
            batches.extend(current);
        }
        batches
    }
}

use Encoding::*;
use FieldId::*;

const MILLIAMPS: Encoding = ScaledUint16 { divisor: 1000 };
const TENTH_KWH: Encoding = ScaledUint32Be { divisor: 10 };

/// Charging current limits accepted by the controller
pub const CURRENT_LIMIT_MIN_A: u16 = 6;
pub const CURRENT_LIMIT_MAX_A: u16 = 32;

static VESTEL_EVC04_FIELDS: [RegisterField; 28] = [
    // Identity
    RegisterField::input(Serial, Group::Identity, 100, AsciiPacked { chars: 50 }),
    RegisterField::input(MaxPower, Group::Identity, 400, Uint32Be).with_unit("W"),
    RegisterField::input(Phases, Group::Identity, 404, Uint16).with_enum(&PHASES),
    // States
    RegisterField::input(ChargepointState, Group::States, 1000, Uint16)
        .with_enum(&CHARGEPOINT_STATE),
    RegisterField::input(ChargingState, Group::States, 1001, Uint16).with_enum(&CHARGING_STATE),
    RegisterField::input(EquipmentState, Group::States, 1002, Uint16)
        .with_enum(&EQUIPMENT_STATE),
    RegisterField::input(CableState, Group::States, 1004, Uint16).with_enum(&CABLE_STATE),
    RegisterField::input(FaultCode, Group::States, 1006, Uint32Be),
    // Electrical
    RegisterField::input(CurrentL1, Group::Electrical, 1008, MILLIAMPS).with_unit("A"),
    RegisterField::input(CurrentL2, Group::Electrical, 1010, MILLIAMPS).with_unit("A"),
    RegisterField::input(CurrentL3, Group::Electrical, 1012, MILLIAMPS).with_unit("A"),
    RegisterField::input(VoltageL1, Group::Electrical, 1014, Uint16).with_unit("V"),
    RegisterField::input(VoltageL2, Group::Electrical, 1016, Uint16).with_unit("V"),
    RegisterField::input(VoltageL3, Group::Electrical, 1018, Uint16).with_unit("V"),
    RegisterField::input(TotalPower, Group::Electrical, 1020, Uint32Be).with_unit("W"),
    RegisterField::input(PowerL1, Group::Electrical, 1024, Uint32Be).with_unit("W"),
    RegisterField::input(PowerL2, Group::Electrical, 1028, Uint32Be).with_unit("W"),
    RegisterField::input(PowerL3, Group::Electrical, 1032, Uint32Be).with_unit("W"),
    RegisterField::input(MeterReading, Group::Electrical, 1036, TENTH_KWH).with_unit("kWh"),
    // Limits
    RegisterField::input(SessionMaxCurrent, Group::Limits, 1100, Uint16).with_unit("A"),
    RegisterField::input(EvseMinCurrent, Group::Limits, 1102, Uint16).with_unit("A"),
    RegisterField::input(EvseMaxCurrent, Group::Limits, 1104, Uint16).with_unit("A"),
    RegisterField::input(CableMaxCurrent, Group::Limits, 1106, Uint16).with_unit("A"),
    // Session
    RegisterField::input(SessionEnergy, Group::Session, 1502, Uint32Be).with_unit("Wh"),
    RegisterField::input(SessionDuration, Group::Session, 1508, Uint32Be).with_unit("s"),
    // Settings
    RegisterField::holding(FailsafeCurrent, Group::Settings, 2000, Uint16)
        .with_unit("A")
        .writable(CURRENT_LIMIT_MIN_A, CURRENT_LIMIT_MAX_A),
    RegisterField::holding(FailsafeTimeout, Group::Settings, 2002, Uint16).with_unit("s"),
    RegisterField::holding(DynamicCurrent, Group::Settings, 5004, Uint16)
        .with_unit("A")
        .writable(CURRENT_LIMIT_MIN_A, CURRENT_LIMIT_MAX_A),
];

/// Register catalog of the Vestel EVC04 charge controller
pub static VESTEL_EVC04: RegisterMap = RegisterMap::new("Vestel EVC04", &VESTEL_EVC04_FIELDS);
