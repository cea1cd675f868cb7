//! Register word decoding
//!
//! Turns the raw 16-bit words of one [`RegisterField`] into a typed
//! [`Value`], and back again for writes.

use serde::Serialize;

use crate::error::{EvcError, Result};
use crate::register_map::{Encoding, EnumTable, RegisterField};

/// State code together with its resolved label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumValue {
    pub code: u32,
    pub label: String,
    /// False when the firmware reported a code the table does not list
    pub known: bool,
}

impl EnumValue {
    /// Resolve `code` against `table`; unmapped codes become `Unknown(code)`
    pub fn resolve(table: &EnumTable, code: u32) -> Self {
        match table.label(code) {
            Some(label) => Self {
                code,
                label: label.to_string(),
                known: true,
            },
            None => Self {
                code,
                label: format!("Unknown({})", code),
                known: false,
            },
        }
    }
}

/// Decoded register value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    U16(u16),
    I16(i16),
    U32(u32),
    Scaled(f64),
    Text(String),
    Enum(EnumValue),
}

impl Value {
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            Value::Enum(e) => u16::try_from(e.code).ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U16(v) => Some(u32::from(*v)),
            Value::U32(v) => Some(*v),
            Value::Enum(e) => Some(e.code),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::U16(v) => Some(f64::from(*v)),
            Value::I16(v) => Some(f64::from(*v)),
            Value::U32(v) => Some(f64::from(*v)),
            Value::Scaled(v) => Some(*v),
            Value::Enum(e) => Some(f64::from(e.code)),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }
}

/// Decode the words of one field
pub fn decode(field: &RegisterField, words: &[u16]) -> Result<Value> {
    if words.len() != usize::from(field.count) {
        return Err(EvcError::decode(format!(
            "{:?} at {} {}: expected {} registers, got {}",
            field.id,
            field.kind,
            field.address,
            field.count,
            words.len()
        )));
    }

    let value = match field.encoding {
        Encoding::Uint16 => Value::U16(words[0]),
        Encoding::Int16 => Value::I16(words[0] as i16),
        Encoding::Uint32Be => Value::U32(join_u32(words[0], words[1])),
        Encoding::ScaledUint16 { divisor } => {
            Value::Scaled(f64::from(words[0]) / f64::from(nonzero(field, u32::from(divisor))?))
        },
        Encoding::ScaledUint32Be { divisor } => Value::Scaled(
            f64::from(join_u32(words[0], words[1])) / f64::from(nonzero(field, divisor)?),
        ),
        Encoding::AsciiPacked { .. } => Value::Text(unpack_ascii(words)),
    };

    match (field.enum_table, &value) {
        (Some(table), Value::U16(code)) => Ok(Value::Enum(EnumValue::resolve(table, u32::from(*code)))),
        (Some(table), Value::U32(code)) => Ok(Value::Enum(EnumValue::resolve(table, *code))),
        (Some(table), Value::I16(code)) => {
            Ok(Value::Enum(EnumValue::resolve(table, u32::from(*code as u16))))
        },
        _ => Ok(value),
    }
}

/// Encode a value into the words of one field
pub fn encode(field: &RegisterField, value: &Value) -> Result<Vec<u16>> {
    let mismatch = || {
        EvcError::validation(format!(
            "{:?}: value {:?} does not fit encoding {:?}",
            field.id, value, field.encoding
        ))
    };

    match field.encoding {
        Encoding::Uint16 => {
            let raw = match value {
                Value::I16(v) => u16::try_from(*v).ok(),
                Value::U32(v) => u16::try_from(*v).ok(),
                other => other.as_u16(),
            };
            raw.map(|w| vec![w]).ok_or_else(mismatch)
        },
        Encoding::Int16 => match value {
            Value::I16(v) => Ok(vec![*v as u16]),
            other => other
                .as_u32()
                .and_then(|v| i16::try_from(v).ok())
                .map(|v| vec![v as u16])
                .ok_or_else(mismatch),
        },
        Encoding::Uint32Be => value.as_u32().map(split_u32).ok_or_else(mismatch),
        Encoding::ScaledUint16 { divisor } => {
            let raw = scale_back(value, f64::from(divisor)).ok_or_else(mismatch)?;
            u16::try_from(raw).map(|w| vec![w]).map_err(|_| mismatch())
        },
        Encoding::ScaledUint32Be { divisor } => {
            let raw = scale_back(value, f64::from(divisor)).ok_or_else(mismatch)?;
            u32::try_from(raw).map(split_u32).map_err(|_| mismatch())
        },
        Encoding::AsciiPacked { .. } => {
            let text = value.as_text().ok_or_else(mismatch)?;
            let bytes = text.as_bytes();
            if bytes.len() > usize::from(field.count) * 2 {
                return Err(mismatch());
            }
            let mut words: Vec<u16> = bytes
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
                .collect();
            words.resize(usize::from(field.count), 0);
            Ok(words)
        },
    }
}

/// Unpack two characters per word, high byte first, trimming trailing padding
pub fn unpack_ascii(words: &[u16]) -> String {
    let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    while matches!(bytes.last(), Some(0x00) | Some(b' ')) {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn join_u32(high: u16, low: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

fn split_u32(value: u32) -> Vec<u16> {
    vec![(value >> 16) as u16, (value & 0xFFFF) as u16]
}

fn nonzero(field: &RegisterField, divisor: u32) -> Result<u32> {
    if divisor == 0 {
        return Err(EvcError::decode(format!(
            "{:?}: scaling divisor is zero",
            field.id
        )));
    }
    Ok(divisor)
}

fn scale_back(value: &Value, divisor: f64) -> Option<u64> {
    let scaled = (value.as_f64()? * divisor).round();
    if !(0.0..=u64::MAX as f64).contains(&scaled) {
        return None;
    }
    Some(scaled as u64)
}
