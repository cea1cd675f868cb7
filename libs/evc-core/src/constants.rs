//! Modbus protocol constants
//!
//! Only the subset the charge controller link needs: MBAP framing, the three
//! function codes in use and the per-request register limit.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// MBAP header length including the unit id
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1)
pub const MBAP_HEADER_LEN: usize = 7;

/// Maximum PDU size per Modbus specification
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Protocol identifier carried in every MBAP header
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Default Modbus TCP port
pub const DEFAULT_MODBUS_PORT: u16 = 502;

// ============================================================================
// Function Codes
// ============================================================================

pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04
///
/// Response PDU: Function Code (1) + Byte Count (1) + N × 2 ≤ 253,
/// therefore N ≤ 125.
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;

/// Largest hole between two fields that is still read as part of one batch
pub const MAX_BATCH_GAP: u16 = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_limits() {
        let read_pdu_size = 1 + 1 + (MODBUS_MAX_READ_REGISTERS as usize * 2);
        assert!(read_pdu_size <= MAX_PDU_SIZE);
        assert_eq!(MAX_MBAP_LENGTH, 254);
    }

    #[test]
    fn test_exception_flag_marks_function_codes() {
        assert_eq!(FC_READ_INPUT_REGISTERS | EXCEPTION_FLAG, 0x84);
        assert_eq!(FC_WRITE_SINGLE_REGISTER | EXCEPTION_FLAG, 0x86);
    }
}
