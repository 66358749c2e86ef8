//! 8-byte big-endian header codec for requests and acknowledgements.

use crate::error::CodecError;

pub const SKARAB_REQ: u16 = 0x0051;
pub const SKARAB_ACK: u16 = 0x0052;
pub const ACK_ERROR_NONE: u16 = 0;

pub const HEADER_LEN: usize = 8;

/// Request header (sender -> board). `chunk` and `total` are already the
/// wire values (`peer.chunk + 1` and `chunk_count`), not the peer cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub sequence: u16,
    pub chunk: u16,
    pub total: u16,
}

impl RequestHeader {
    pub fn encode_into(&self, buf: &mut [u8; HEADER_LEN]) {
        buf[0..2].copy_from_slice(&SKARAB_REQ.to_be_bytes());
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..6].copy_from_slice(&self.chunk.to_be_bytes());
        buf[6..8].copy_from_slice(&self.total.to_be_bytes());
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        self.encode_into(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != HEADER_LEN {
            return Err(CodecError::Misfit(bytes.len()));
        }
        let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
        if magic != SKARAB_REQ {
            return Err(CodecError::BadMagic(magic));
        }
        Ok(RequestHeader {
            sequence: u16::from_be_bytes([bytes[2], bytes[3]]),
            chunk: u16::from_be_bytes([bytes[4], bytes[5]]),
            total: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Acknowledgement header (board -> sender).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHeader {
    pub sequence: u16,
    pub chunk: u16,
}

impl AckHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&SKARAB_ACK.to_be_bytes());
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..6].copy_from_slice(&self.chunk.to_be_bytes());
        buf[6..8].copy_from_slice(&ACK_ERROR_NONE.to_be_bytes());
        buf
    }

    /// Decode and validate length, magic and error-code in one pass, as
    /// the wire contract requires before sequence/chunk are inspected.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != HEADER_LEN {
            return Err(CodecError::Misfit(bytes.len()));
        }
        let magic = u16::from_be_bytes([bytes[0], bytes[1]]);
        if magic != SKARAB_ACK {
            return Err(CodecError::BadMagic(magic));
        }
        let error = u16::from_be_bytes([bytes[6], bytes[7]]);
        if error != ACK_ERROR_NONE {
            return Err(CodecError::BoardError(error));
        }
        Ok(AckHeader {
            sequence: u16::from_be_bytes([bytes[2], bytes[3]]),
            chunk: u16::from_be_bytes([bytes[4], bytes[5]]),
        })
    }
}
