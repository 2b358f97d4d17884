//! Reader frame codec
//!
//! Frame format: [0xBB] [TYPE] [CMD] [LEN_H LEN_L] [PAYLOAD] [CHECKSUM] [0x7E]
//!
//! The checksum is the wrapping 8-bit sum of every byte from TYPE through
//! the last payload byte. Total frame length is always 7 + payload length.
//!
//! Decoding validates framing only; mapping a frame to its meaning lives in
//! `decoder.rs`.

use super::constants::*;
use crate::error::{Error, Result};
use std::fmt::Write as _;

/// Frame validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame too short ({len} bytes)")]
    ShortFrame { len: usize },

    #[error("Invalid header {0:#04x}")]
    BadHeader(u8),

    #[error("Invalid end byte {0:#04x}")]
    BadEnd(u8),

    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Checksum fail: calculated {expected:#04x}, received {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Frame direction/kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Command,
    Response,
    Notification,
    /// Type byte outside the documented set, kept verbatim
    Other(u8),
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            TYPE_COMMAND => FrameType::Command,
            TYPE_RESPONSE => FrameType::Response,
            TYPE_NOTIFICATION => FrameType::Notification,
            other => FrameType::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            FrameType::Command => TYPE_COMMAND,
            FrameType::Response => TYPE_RESPONSE,
            FrameType::Notification => TYPE_NOTIFICATION,
            FrameType::Other(byte) => byte,
        }
    }
}

/// One validated protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub command: u8,
    pub payload: Vec<u8>,
}

/// Wrapping 8-bit sum used as the frame checksum
#[inline]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

impl Frame {
    pub fn new(frame_type: FrameType, command: u8, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            command,
            payload,
        }
    }

    /// Host-to-reader command frame
    pub fn command(command: u8, payload: Vec<u8>) -> Self {
        Self::new(FrameType::Command, command, payload)
    }

    /// Total encoded length
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Serialize to wire bytes
    ///
    /// Fails only when the payload would push the frame past the module's
    /// maximum frame size.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::InvalidParameter(format!(
                "payload of {} bytes exceeds the {} byte maximum",
                self.payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let len = self.payload.len() as u16;
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.push(FRAME_HEADER);
        bytes.push(self.frame_type.as_byte());
        bytes.push(self.command);
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(&bytes[1..]));
        bytes.push(FRAME_END);
        Ok(bytes)
    }

    /// Validate and parse one complete frame
    pub fn decode(buf: &[u8]) -> std::result::Result<Frame, DecodeError> {
        if buf.len() < FRAME_OVERHEAD {
            return Err(DecodeError::ShortFrame { len: buf.len() });
        }
        if buf[0] != FRAME_HEADER {
            return Err(DecodeError::BadHeader(buf[0]));
        }
        let last = buf[buf.len() - 1];
        if last != FRAME_END {
            return Err(DecodeError::BadEnd(last));
        }

        let payload_len = u16::from_be_bytes([buf[3], buf[4]]) as usize;
        let expected = FRAME_OVERHEAD + payload_len;
        if buf.len() != expected {
            return Err(DecodeError::LengthMismatch {
                expected,
                actual: buf.len(),
            });
        }

        let checksum_index = buf.len() - 2;
        let calculated = checksum(&buf[1..checksum_index]);
        let received = buf[checksum_index];
        if calculated != received {
            return Err(DecodeError::ChecksumMismatch {
                expected: calculated,
                actual: received,
            });
        }

        Ok(Frame {
            frame_type: FrameType::from_byte(buf[1]),
            command: buf[2],
            payload: buf[5..checksum_index].to_vec(),
        })
    }
}

/// Uppercase hex bytes separated by spaces ("BB 00 03")
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Parse hex text, ignoring whitespace. Returns `None` for odd length or
/// non-hex characters.
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(digits).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_frame() -> Vec<u8> {
        // GetPower response, 2000 (20 dBm)
        vec![0xBB, 0x01, 0xB7, 0x00, 0x02, 0x07, 0xD0, 0x91, 0x7E]
    }

    #[test]
    fn test_encode_set_power() {
        let frame = Frame::command(CMD_SET_POWER, 2000u16.to_be_bytes().to_vec());
        assert_eq!(
            frame.encode().unwrap(),
            vec![0xBB, 0x00, 0xB6, 0x00, 0x02, 0x07, 0xD0, 0x8F, 0x7E]
        );
    }

    #[test]
    fn test_encode_empty_payload() {
        let bytes = Frame::command(CMD_GET_POWER, vec![]).encode().unwrap();
        assert_eq!(bytes, vec![0xBB, 0x00, 0xB7, 0x00, 0x00, 0xB7, 0x7E]);
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let frame = Frame::command(CMD_WRITE_DATA, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(frame.encode(), Err(Error::InvalidParameter(_))));

        let frame = Frame::command(CMD_WRITE_DATA, vec![0u8; MAX_PAYLOAD_SIZE]);
        assert_eq!(frame.encode().unwrap().len(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_decode_valid() {
        let frame = Frame::decode(&valid_frame()).unwrap();
        assert_eq!(frame.frame_type, FrameType::Response);
        assert_eq!(frame.command, CMD_GET_POWER);
        assert_eq!(frame.payload, vec![0x07, 0xD0]);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Frame::decode(&[0xBB, 0x01, 0x7E]),
            Err(DecodeError::ShortFrame { len: 3 })
        );

        let mut bad_header = valid_frame();
        bad_header[0] = 0xAA;
        assert_eq!(Frame::decode(&bad_header), Err(DecodeError::BadHeader(0xAA)));

        let mut bad_end = valid_frame();
        bad_end[8] = 0x00;
        assert_eq!(Frame::decode(&bad_end), Err(DecodeError::BadEnd(0x00)));

        let mut bad_len = valid_frame();
        bad_len[4] = 0x03;
        assert_eq!(
            Frame::decode(&bad_len),
            Err(DecodeError::LengthMismatch {
                expected: 10,
                actual: 9
            })
        );

        let mut bad_sum = valid_frame();
        bad_sum[7] = 0x90;
        assert_eq!(
            Frame::decode(&bad_sum),
            Err(DecodeError::ChecksumMismatch {
                expected: 0x91,
                actual: 0x90
            })
        );
    }

    #[test]
    fn test_checksum_invariant() {
        for payload_len in [0usize, 1, 5, 17, 64] {
            let payload: Vec<u8> = (0..payload_len).map(|i| (i * 37) as u8).collect();
            let bytes = Frame::new(FrameType::Notification, 0x22, payload)
                .encode()
                .unwrap();
            let n = bytes.len();
            assert_eq!(checksum(&bytes[1..n - 2]), bytes[n - 2]);
            assert_eq!(n, FRAME_OVERHEAD + payload_len);
        }
    }

    #[test]
    fn test_unknown_type_preserved() {
        let bytes = Frame::new(FrameType::Other(0x05), 0x01, vec![0xAA])
            .encode()
            .unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.frame_type, FrameType::Other(0x05));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(hex_dump(&[0xBB, 0x00, 0x7E]), "BB 00 7E");
        assert_eq!(hex_dump(&[]), "");
        assert_eq!(parse_hex("bb 00 03"), Some(vec![0xBB, 0x00, 0x03]));
        assert_eq!(parse_hex("BB0"), None);
        assert_eq!(parse_hex("ZZ"), None);
    }
}
