//! CRC16-CCITT (polynomial 0x1021, zero init) as used by the VESC wire
//! protocol.

/// Compute the frame checksum over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(crc16(&[]), 0x0000);
        // Checksum of the telemetry poll payload.
        assert_eq!(crc16(&[0x33, 0x00, 0x01, 0x01, 0xb0]), 0x41e6);
    }

    #[test]
    fn single_bit_changes_crc() {
        let a = crc16(&[0x33, 0x00, 0x01, 0x01, 0xb0]);
        let b = crc16(&[0x33, 0x00, 0x01, 0x01, 0xb1]);
        assert_ne!(a, b);
    }
}
