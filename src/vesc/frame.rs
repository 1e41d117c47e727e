//! Wire framing for the motor-controller link.
//!
//! Frame layout: `START(1) LEN(1) PAYLOAD(LEN) CRC16(2, BE) END(1)`, with
//! CRC16-CCITT computed over the payload only. The extractor is resumable:
//! partial frames stay in the ring untouched and are retried on the next
//! line-idle event.

use heapless::Vec;

use super::crc::crc16;
use super::ring::ByteRing;

pub const START: u8 = 0x02;
pub const END: u8 = 0x03;
/// Largest payload this side will ever accept.
pub const MAX_PAYLOAD: usize = 32;

/// Telemetry request: COMM_GET_VALUES_SETUP_SELECTIVE.
pub const CMD_GET_VALUES_SELECTIVE: u8 = 0x33;
/// Field mask requested from the controller: duty cycle, RPM, battery
/// level, fault code. The response must echo this mask back.
pub const TELEMETRY_MASK: u32 = 0x0001_01b0;
/// Payload length of a response to the telemetry request.
pub const TELEMETRY_RESPONSE_LEN: usize = 16;

/// The fixed poll request, precomputed: header, command, mask, CRC, end.
pub const POLL_FRAME: [u8; 10] = [
    START, 0x05, CMD_GET_VALUES_SELECTIVE, 0x00, 0x01, 0x01, 0xb0, 0x41, 0xe6, END,
];

/// An extracted, CRC-verified payload.
pub type Payload = Vec<u8, MAX_PAYLOAD>;

/// The one framing violation that indicates firmware mismatch rather than
/// line noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Declared length exceeds the maximum payload size.
    OversizeLength,
}

/// Try to extract one complete, valid frame from the ring.
///
/// Scans forward discarding garbage until a start marker, then requires the
/// whole frame to be buffered before consuming anything past the scan —
/// `Ok(None)` means "nothing complete yet", which is expected and not an
/// error. A frame failing the CRC or end-marker check is abandoned by
/// discarding its start byte and rescanning, so a marker byte inside noise
/// cannot wedge the stream. An oversize declared length aborts the call so
/// the caller can escalate it.
pub fn extract_frame(ring: &mut ByteRing) -> Result<Option<Payload>, FrameError> {
    loop {
        // Scan to the next start marker.
        loop {
            match ring.peek() {
                Some(START) => break,
                Some(_) => {
                    ring.skip(1);
                }
                None => return Ok(None),
            }
        }

        let Some(len) = ring.peek_at(1) else {
            return Ok(None);
        };
        let len = len as usize;
        if len > MAX_PAYLOAD {
            // Resync past the bogus start byte before reporting.
            ring.skip(1);
            return Err(FrameError::OversizeLength);
        }

        let total = 1 + 1 + len + 2 + 1;
        if ring.len() < total {
            return Ok(None);
        }

        if ring.peek_at(total - 1) != Some(END) {
            ring.skip(1);
            continue;
        }

        let mut payload = Payload::new();
        for i in 0..len {
            // Bounds were checked against `total` above.
            let _ = payload.push(ring.peek_at(2 + i).unwrap_or(0));
        }
        let rx_crc = ((ring.peek_at(2 + len).unwrap_or(0) as u16) << 8)
            | ring.peek_at(3 + len).unwrap_or(0) as u16;
        if crc16(&payload) != rx_crc {
            ring.skip(1);
            continue;
        }

        ring.skip(total);
        return Ok(Some(payload));
    }
}

/// Wrap `payload` in a frame: start, length, payload, CRC, end.
pub fn encode_frame(payload: &[u8]) -> Vec<u8, { MAX_PAYLOAD + 5 }> {
    let mut out = Vec::new();
    let _ = out.push(START);
    let _ = out.push(payload.len() as u8);
    let _ = out.extend_from_slice(payload);
    let crc = crc16(payload);
    let _ = out.push((crc >> 8) as u8);
    let _ = out.push(crc as u8);
    let _ = out.push(END);
    out
}

pub fn read_i16_be(bytes: &[u8]) -> i16 {
    i16::from_be_bytes([bytes[0], bytes[1]])
}

pub fn read_i32_be(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
