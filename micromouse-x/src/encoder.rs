//! Framing for the 14-bit magnetic angle sensors on the wheels.
//!
//! Frames are 16 bits: the command carries the register in bits 1..14, the read flag in bit 15 and
//! an even parity bit in bit 0. A response carries the value in bits 2..15, an error flag in bit 1
//! and even parity over bits 1..15 in bit 0.

pub const REG_NOP: u16 = 0x0000;
pub const REG_MASTER_RESET: u16 = 0x33A5;
pub const REG_ANGULAR_DATA: u16 = 0x3FFF;

pub const RESOLUTION: u16 = 1 << 14;

const READ_FLAG: u16 = 0x8000;
const ERROR_FLAG: u16 = 0x0002;
const ANGLE_MASK: u16 = RESOLUTION - 1;

/// 1 if `value` has an odd number of set bits.
pub fn parity(value: u16) -> u16 {
    (value.count_ones() & 1) as u16
}

pub fn command_frame(reg: u16, read: bool) -> u16 {
    let frame = (reg << 1) | if read { READ_FLAG } else { 0 };
    frame | parity(frame)
}

pub fn verify_response(response: u16) -> bool {
    (response & 1) == parity(response >> 1) && (response & ERROR_FLAG) == 0
}

/// Extracts the angle from a response, or `None` if the frame is corrupt or flags an error.
pub fn decode_angle(response: u16) -> Option<u16> {
    if verify_response(response) {
        Some((response >> 2) & ANGLE_MASK)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_for(angle: u16) -> u16 {
        let body = angle << 2;
        body | parity(body >> 1)
    }

    #[test]
    fn command_frames_have_even_parity() {
        for reg in [REG_NOP, REG_MASTER_RESET, REG_ANGULAR_DATA] {
            for read in [false, true] {
                assert_eq!(command_frame(reg, read).count_ones() % 2, 0);
            }
        }
        assert_eq!(command_frame(REG_ANGULAR_DATA, true), 0xFFFF);
        assert_eq!(command_frame(REG_NOP, false), 0x0000);
    }

    #[test]
    fn decodes_valid_angle() {
        assert_eq!(decode_angle(response_for(0)), Some(0));
        assert_eq!(decode_angle(response_for(1234)), Some(1234));
        assert_eq!(decode_angle(response_for(RESOLUTION - 1)), Some(RESOLUTION - 1));
    }

    #[test]
    fn rejects_bad_parity() {
        assert_eq!(decode_angle(response_for(1234) ^ 1), None);
        assert_eq!(decode_angle(response_for(1234) ^ 0x0100), None);
    }

    #[test]
    fn rejects_error_flag() {
        let response = response_for(1234) | ERROR_FLAG;
        // Keep parity valid so only the error flag is wrong
        let response = (response & !1) | parity(response >> 1);
        assert_eq!(decode_angle(response), None);
    }
}
