//! Wire framing for steady-state datagrams
//!
//! Every steady-state datagram carries one sample vector:
//!
//! ```text
//! ┌─────────────────────────────┬──────────────────┐
//! │ Payload (width × 4 bytes)   │ CRC-16 (2 bytes) │
//! │ Little-endian f32 samples   │ Little-endian    │
//! └─────────────────────────────┴──────────────────┘
//! ```
//!
//! The CRC is CRC-16/CCITT (poly 0x1021, init 0xFFFF, no reflection, no
//! final XOR) computed over the payload bytes only. UDP's own checksum is
//! optional on IPv4 and too weak for data that drives actuation, so framing
//! carries its own.
//!
//! The data path is f32-only. The [`SampleType`] tag advertised during
//! negotiation tells the peer how *we* encode outgoing samples; what the
//! peer advertises is recorded for diagnostics but not used to re-interpret
//! incoming bytes.

use serde::Deserialize;

/// Trailing CRC length in bytes
pub const CRC_LEN: usize = 2;

/// Bytes per sample on the f32 data path
pub const SAMPLE_LEN: usize = 4;

/// Sample encoding advertised in the handshake.
///
/// Each variant maps to a single ASCII tag byte on the wire. The tag set is
/// closed; unknown tags from a peer are kept as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    #[default]
    F32,
    F64,
}

impl SampleType {
    /// Wire tag byte for this encoding
    pub fn tag(self) -> u8 {
        match self {
            SampleType::I8 => b'b',
            SampleType::U8 => b'B',
            SampleType::I16 => b'h',
            SampleType::U16 => b'H',
            SampleType::I32 => b'i',
            SampleType::U32 => b'I',
            SampleType::I64 => b'q',
            SampleType::U64 => b'Q',
            SampleType::F32 => b'f',
            SampleType::F64 => b'd',
        }
    }

    /// Parse a wire tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'b' => Some(SampleType::I8),
            b'B' => Some(SampleType::U8),
            b'h' => Some(SampleType::I16),
            b'H' => Some(SampleType::U16),
            b'i' => Some(SampleType::I32),
            b'I' => Some(SampleType::U32),
            b'q' => Some(SampleType::I64),
            b'Q' => Some(SampleType::U64),
            b'f' => Some(SampleType::F32),
            b'd' => Some(SampleType::F64),
            _ => None,
        }
    }

    /// Size of one sample in bytes
    pub fn size(self) -> usize {
        match self {
            SampleType::I8 | SampleType::U8 => 1,
            SampleType::I16 | SampleType::U16 => 2,
            SampleType::I32 | SampleType::U32 | SampleType::F32 => 4,
            SampleType::I64 | SampleType::U64 | SampleType::F64 => 8,
        }
    }
}

/// Why an incoming datagram was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram length is incompatible with the negotiated vector width
    ShapeInvalid,
    /// Trailing CRC does not match the payload
    Corrupt,
}

/// CRC-16/CCITT: poly 0x1021, init 0xFFFF, MSB-first, no reflection, no
/// final XOR.
///
/// This is the canonical implementation used by both the send and receive
/// paths.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
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

/// Frame a sample vector: little-endian f32 payload followed by the CRC.
pub fn encode(values: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * SAMPLE_LEN + CRC_LEN);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    let crc = crc16_ccitt(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Parse and validate a framed datagram.
///
/// Succeeds iff the datagram is at least `CRC_LEN` bytes, the trailing CRC
/// matches the payload, and the payload holds exactly `expected_width`
/// samples. Checks run in that order so the counters attribute drops the
/// same way the receive loop does: length first, then integrity, then shape.
pub fn decode(bytes: &[u8], expected_width: u16) -> Result<Vec<f32>, FrameError> {
    if bytes.len() < CRC_LEN {
        return Err(FrameError::ShapeInvalid);
    }

    let (payload, crc_bytes) = bytes.split_at(bytes.len() - CRC_LEN);
    let received_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    if crc16_ccitt(payload) != received_crc {
        return Err(FrameError::Corrupt);
    }

    if payload.len() != expected_width as usize * SAMPLE_LEN {
        return Err(FrameError::ShapeInvalid);
    }

    let values = payload
        .chunks_exact(SAMPLE_LEN)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_empty() {
        // CRC-16/CCITT of nothing is the init value
        assert_eq!(crc16_ccitt(&[]), 0xFFFF);
    }

    #[test]
    fn test_crc_check_value() {
        // Standard CRC-16/CCITT-FALSE check value
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode(&[1.0, 2.0]);
        assert_eq!(frame.len(), 10);
        assert_eq!(&frame[..4], &1.0f32.to_le_bytes());
        assert_eq!(&frame[4..8], &2.0f32.to_le_bytes());

        let crc = u16::from_le_bytes([frame[8], frame[9]]);
        assert_eq!(crc, crc16_ccitt(&frame[..8]));
    }

    #[test]
    fn test_round_trip() {
        let values = [0.0f32, -1.5, 3.25, f32::MAX, f32::MIN_POSITIVE];
        let decoded = decode(&encode(&values), 5).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_empty_vector_round_trip() {
        // Zero-width frame is just the CRC of nothing
        let frame = encode(&[]);
        assert_eq!(frame, 0xFFFFu16.to_le_bytes());
        assert_eq!(decode(&frame, 0).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_too_short_is_shape_invalid() {
        assert_eq!(decode(&[], 1), Err(FrameError::ShapeInvalid));
        assert_eq!(decode(&[0x42], 1), Err(FrameError::ShapeInvalid));
    }

    #[test]
    fn test_bit_flip_is_corrupt() {
        let mut frame = encode(&[1.0, 2.0]);
        frame[3] ^= 0x01;
        assert_eq!(decode(&frame, 2), Err(FrameError::Corrupt));
    }

    #[test]
    fn test_crc_flip_is_corrupt() {
        let mut frame = encode(&[1.0]);
        let last = frame.len() - 1;
        frame[last] ^= 0x80;
        assert_eq!(decode(&frame, 1), Err(FrameError::Corrupt));
    }

    #[test]
    fn test_wrong_width_is_shape_invalid() {
        // Valid CRC, but the receiver expects 3 samples
        let frame = encode(&[1.0, 2.0]);
        assert_eq!(decode(&frame, 3), Err(FrameError::ShapeInvalid));
    }

    #[test]
    fn test_sample_type_tags() {
        for st in [
            SampleType::I8,
            SampleType::U8,
            SampleType::I16,
            SampleType::U16,
            SampleType::I32,
            SampleType::U32,
            SampleType::I64,
            SampleType::U64,
            SampleType::F32,
            SampleType::F64,
        ] {
            assert_eq!(SampleType::from_tag(st.tag()), Some(st));
        }
        assert_eq!(SampleType::from_tag(b'x'), None);
        assert_eq!(SampleType::F32.tag(), b'f');
        assert_eq!(SampleType::F64.size(), 8);
    }
}
