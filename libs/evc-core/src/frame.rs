//! Modbus TCP framing
//!
//! MBAP header handling and the three request/response PDUs the controller
//! link uses (FC03, FC04, FC06). Pure byte work, no I/O.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::constants::{
    EXCEPTION_FLAG, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_SINGLE_REGISTER,
    MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MODBUS_PROTOCOL_ID,
};
use crate::error::{EvcError, Result};
use crate::register_map::RegisterKind;

/// Modbus TCP MBAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Unit id + PDU length
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Parse and sanity-check a received header
    pub fn parse(data: &[u8; MBAP_HEADER_LEN]) -> Result<Self> {
        let header = Self {
            transaction_id: u16::from_be_bytes([data[0], data[1]]),
            protocol_id: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            unit_id: data[6],
        };

        if header.protocol_id != MODBUS_PROTOCOL_ID {
            return Err(EvcError::protocol(format!(
                "unexpected protocol id {}",
                header.protocol_id
            )));
        }
        // Unit id plus at least a function code and one byte
        if header.length < 3 || usize::from(header.length) > MAX_MBAP_LENGTH {
            return Err(EvcError::protocol(format!(
                "invalid MBAP length {}",
                header.length
            )));
        }
        Ok(header)
    }

    /// Bytes of PDU following the header
    pub fn pdu_len(&self) -> usize {
        usize::from(self.length) - 1
    }
}

/// Builds outgoing frames and hands out transaction ids
#[derive(Debug)]
pub struct FrameCodec {
    next_transaction_id: u16,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            next_transaction_id: 1,
        }
    }

    /// Get next transaction ID, skipping zero on wrap-around
    pub fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        if self.next_transaction_id == 0 {
            self.next_transaction_id = 1;
        }
        id
    }

    /// Build MBAP + PDU, returning the transaction id used
    pub fn encode(&mut self, unit_id: u8, pdu: &[u8]) -> (u16, Bytes) {
        let transaction_id = self.next_transaction_id();
        let length = (pdu.len() + 1) as u16;

        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
        frame.put_u16(transaction_id);
        frame.put_u16(MODBUS_PROTOCOL_ID);
        frame.put_u16(length);
        frame.put_u8(unit_id);
        frame.put_slice(pdu);

        trace!(
            "Built frame: trans_id={:04X}, unit_id={}, pdu_len={}",
            transaction_id,
            unit_id,
            pdu.len()
        );
        (transaction_id, frame.freeze())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// A request with addresses already translated to wire addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    ReadRegisters {
        kind: RegisterKind,
        address: u16,
        count: u16,
    },
    WriteSingleRegister {
        address: u16,
        value: u16,
    },
}

/// Decoded response PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Registers(Vec<u16>),
    WriteAck { address: u16, value: u16 },
}

impl Request {
    pub fn function_code(&self) -> u8 {
        match self {
            Request::ReadRegisters {
                kind: RegisterKind::Input,
                ..
            } => FC_READ_INPUT_REGISTERS,
            Request::ReadRegisters {
                kind: RegisterKind::Holding,
                ..
            } => FC_READ_HOLDING_REGISTERS,
            Request::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
        }
    }

    pub fn to_pdu(&self) -> Bytes {
        let mut pdu = BytesMut::with_capacity(5);
        pdu.put_u8(self.function_code());
        match *self {
            Request::ReadRegisters { address, count, .. } => {
                pdu.put_u16(address);
                pdu.put_u16(count);
            },
            Request::WriteSingleRegister { address, value } => {
                pdu.put_u16(address);
                pdu.put_u16(value);
            },
        }
        pdu.freeze()
    }

    /// Short description for logs and error context
    pub fn describe(&self) -> String {
        match self {
            Request::ReadRegisters {
                kind,
                address,
                count,
            } => format!("read {} {} x{}", kind, address, count),
            Request::WriteSingleRegister { address, value } => {
                format!("write holding {} = {}", address, value)
            },
        }
    }

    /// Validate and decode the response PDU for this request
    pub fn parse_response(&self, pdu: &[u8]) -> Result<Response> {
        let fc = self.function_code();
        let Some(&received_fc) = pdu.first() else {
            return Err(EvcError::protocol(format!("{}: empty response PDU", self.describe())));
        };

        if received_fc == fc | EXCEPTION_FLAG {
            let code = pdu.get(1).copied().unwrap_or(0);
            let msg = format!(
                "{}: exception 0x{:02X} ({})",
                self.describe(),
                code,
                exception_description(code)
            );
            return Err(match self {
                Request::WriteSingleRegister { .. } => EvcError::rejected(msg),
                Request::ReadRegisters { .. } => EvcError::protocol(msg),
            });
        }

        if received_fc != fc {
            return Err(EvcError::protocol(format!(
                "{}: function code mismatch, expected {:02X}, got {:02X}",
                self.describe(),
                fc,
                received_fc
            )));
        }

        match *self {
            Request::ReadRegisters { count, .. } => {
                let expected = usize::from(count) * 2;
                let byte_count = pdu.get(1).copied().map(usize::from);
                if byte_count != Some(expected) || pdu.len() != 2 + expected {
                    return Err(EvcError::protocol(format!(
                        "{}: expected {} data bytes, got {:?} (pdu {} bytes)",
                        self.describe(),
                        expected,
                        byte_count,
                        pdu.len()
                    )));
                }
                let words = pdu[2..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Ok(Response::Registers(words))
            },
            Request::WriteSingleRegister { address, value } => {
                if pdu.len() != 5 {
                    return Err(EvcError::protocol(format!(
                        "{}: write echo has {} bytes",
                        self.describe(),
                        pdu.len()
                    )));
                }
                let echoed_address = u16::from_be_bytes([pdu[1], pdu[2]]);
                let echoed_value = u16::from_be_bytes([pdu[3], pdu[4]]);
                if echoed_address != address || echoed_value != value {
                    return Err(EvcError::protocol(format!(
                        "{}: device echoed {} = {}",
                        self.describe(),
                        echoed_address,
                        echoed_value
                    )));
                }
                Ok(Response::WriteAck { address, value })
            },
        }
    }
}

/// Get exception description
pub fn exception_description(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_tcp_frame_layout() {
        let mut codec = FrameCodec::new();
        let request = Request::ReadRegisters {
            kind: RegisterKind::Input,
            address: 999,
            count: 8,
        };
        let (tid, frame) = codec.encode(3, &request.to_pdu());
        assert_eq!(tid, 1);
        assert_eq!(
            frame.as_ref(),
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x03, 0x04, 0x03, 0xE7, 0x00, 0x08]
        );
    }

    #[test]
    fn test_transaction_id_skips_zero() {
        let mut codec = FrameCodec {
            next_transaction_id: u16::MAX,
        };
        assert_eq!(codec.next_transaction_id(), u16::MAX);
        assert_eq!(codec.next_transaction_id(), 1);
    }

    #[test]
    fn test_header_validation() {
        let ok = MbapHeader::parse(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x05, 0x01]).unwrap();
        assert_eq!(ok.transaction_id, 7);
        assert_eq!(ok.pdu_len(), 4);

        assert!(MbapHeader::parse(&[0x00, 0x07, 0x00, 0x01, 0x00, 0x05, 0x01]).is_err());
        assert!(MbapHeader::parse(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0x01]).is_err());
        assert!(MbapHeader::parse(&[0x00, 0x07, 0x00, 0x00, 0x01, 0x00, 0x01]).is_err());
    }

    #[test]
    fn test_parse_register_response() {
        let request = Request::ReadRegisters {
            kind: RegisterKind::Holding,
            address: 2000,
            count: 2,
        };
        let words = request
            .parse_response(&[0x03, 0x04, 0x00, 0x10, 0x00, 0x3C])
            .unwrap();
        assert_eq!(words, Response::Registers(vec![16, 60]));

        let short = request.parse_response(&[0x03, 0x02, 0x00, 0x10]);
        assert!(matches!(short, Err(EvcError::ProtocolError(_))));
    }

    #[test]
    fn test_read_exception_is_protocol_error() {
        let request = Request::ReadRegisters {
            kind: RegisterKind::Input,
            address: 1000,
            count: 8,
        };
        let err = request.parse_response(&[0x84, 0x02]).unwrap_err();
        assert!(matches!(err, EvcError::ProtocolError(_)));
        assert!(err.to_string().contains("Illegal Data Address"));
    }

    #[test]
    fn test_write_exception_is_rejection() {
        let request = Request::WriteSingleRegister {
            address: 5004,
            value: 16,
        };
        let err = request.parse_response(&[0x86, 0x04]).unwrap_err();
        assert!(matches!(err, EvcError::RejectedError(_)));
    }

    #[test]
    fn test_write_echo_must_match() {
        let request = Request::WriteSingleRegister {
            address: 5004,
            value: 16,
        };
        let ack = request
            .parse_response(&[0x06, 0x13, 0x8C, 0x00, 0x10])
            .unwrap();
        assert_eq!(
            ack,
            Response::WriteAck {
                address: 5004,
                value: 16
            }
        );
        let wrong = request.parse_response(&[0x06, 0x13, 0x8C, 0x00, 0x20]);
        assert!(matches!(wrong, Err(EvcError::ProtocolError(_))));
    }

    #[test]
    fn test_function_code_mismatch() {
        let request = Request::ReadRegisters {
            kind: RegisterKind::Input,
            address: 0,
            count: 1,
        };
        assert!(request.parse_response(&[0x03, 0x02, 0x00, 0x01]).is_err());
        assert!(request.parse_response(&[]).is_err());
    }
}
