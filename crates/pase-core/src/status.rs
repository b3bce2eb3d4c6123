//! Secure-channel StatusReport.
//!
//! Wire format (little-endian, not TLV):
//!
//! ```text
//! +--------------+-----------------+-------------------+----------------+
//! | general: u16 | protocol_id:u32 | protocol_code:u16 | protocol data  |
//! +--------------+-----------------+-------------------+----------------+
//! ```

use crate::{Error, Result};

/// Protocol id of the secure-channel protocol.
pub const SECURE_CHANNEL_PROTOCOL_ID: u32 = 0x0000_0000;

const HEADER_LEN: usize = 8;

/// StatusReport general codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GeneralCode {
    /// Operation completed successfully.
    Success = 0,
    /// Generic failure.
    Failure = 1,
    /// Operation rejected by the system state.
    BadPrecondition = 2,
    /// Argument out of range.
    OutOfRange = 3,
    /// Malformed request.
    BadRequest = 4,
    /// Unsupported operation.
    Unsupported = 5,
    /// Unexpected message or state.
    Unexpected = 6,
    /// Resource exhausted.
    ResourceExhausted = 7,
    /// Peer busy, retry later.
    Busy = 8,
    /// Operation timed out.
    Timeout = 9,
    /// More to come.
    Continue = 10,
    /// Operation aborted.
    Aborted = 11,
    /// Invalid argument.
    InvalidArgument = 12,
    /// Entity not found.
    NotFound = 13,
    /// Entity already exists.
    AlreadyExists = 14,
    /// Permission denied.
    PermissionDenied = 15,
    /// Unrecoverable data loss.
    DataLoss = 16,
}

impl GeneralCode {
    /// Convert to wire format.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Convert from wire format.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            2 => Some(Self::BadPrecondition),
            3 => Some(Self::OutOfRange),
            4 => Some(Self::BadRequest),
            5 => Some(Self::Unsupported),
            6 => Some(Self::Unexpected),
            7 => Some(Self::ResourceExhausted),
            8 => Some(Self::Busy),
            9 => Some(Self::Timeout),
            10 => Some(Self::Continue),
            11 => Some(Self::Aborted),
            12 => Some(Self::InvalidArgument),
            13 => Some(Self::NotFound),
            14 => Some(Self::AlreadyExists),
            15 => Some(Self::PermissionDenied),
            16 => Some(Self::DataLoss),
            _ => None,
        }
    }
}

/// Secure-channel protocol codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ProtocolCode {
    /// Session established.
    SessionEstablishmentSuccess = 0x0000,
    /// No shared trust roots (CASE only).
    NoSharedTrustRoots = 0x0001,
    /// Invalid parameter in a handshake message.
    InvalidParameter = 0x0002,
    /// Sender is closing the session.
    CloseSession = 0x0003,
    /// Responder busy.
    Busy = 0x0004,
}

impl ProtocolCode {
    /// Convert to wire format.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Convert from wire format.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::SessionEstablishmentSuccess),
            0x0001 => Some(Self::NoSharedTrustRoots),
            0x0002 => Some(Self::InvalidParameter),
            0x0003 => Some(Self::CloseSession),
            0x0004 => Some(Self::Busy),
            _ => None,
        }
    }
}

/// A StatusReport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// General status; unknown values are kept raw.
    pub general_code: u16,
    /// Protocol the code belongs to.
    pub protocol_id: u32,
    /// Protocol-specific status.
    pub protocol_code: u16,
    /// Optional protocol-specific data.
    pub protocol_data: Vec<u8>,
}

impl StatusReport {
    /// Secure-channel report with the given codes and no data.
    pub fn new(general: GeneralCode, protocol: ProtocolCode) -> Self {
        Self {
            general_code: general.to_u16(),
            protocol_id: SECURE_CHANNEL_PROTOCOL_ID,
            protocol_code: protocol.to_u16(),
            protocol_data: Vec::new(),
        }
    }

    /// `Success / SessionEstablishmentSuccess`.
    pub fn success() -> Self {
        Self::new(GeneralCode::Success, ProtocolCode::SessionEstablishmentSuccess)
    }

    /// `Failure` with the given protocol code.
    pub fn failure(code: ProtocolCode) -> Self {
        Self::new(GeneralCode::Failure, code)
    }

    /// `Busy / Busy` carrying the minimum wait time in milliseconds.
    pub fn busy(min_wait_ms: u16) -> Self {
        let mut report = Self::new(GeneralCode::Busy, ProtocolCode::Busy);
        report.protocol_data = min_wait_ms.to_le_bytes().to_vec();
        report
    }

    /// True for a secure-channel session-establishment success.
    pub fn is_success(&self) -> bool {
        self.general_code == GeneralCode::Success.to_u16()
            && self.protocol_id == SECURE_CHANNEL_PROTOCOL_ID
            && self.protocol_code == ProtocolCode::SessionEstablishmentSuccess.to_u16()
    }

    /// Decoded general code, if known.
    pub fn general(&self) -> Option<GeneralCode> {
        GeneralCode::from_u16(self.general_code)
    }

    /// Minimum wait carried by a Busy report.
    pub fn busy_wait_ms(&self) -> Option<u16> {
        if self.general() != Some(GeneralCode::Busy) || self.protocol_data.len() < 2 {
            return None;
        }
        Some(u16::from_le_bytes([
            self.protocol_data[0],
            self.protocol_data[1],
        ]))
    }

    /// Parse from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::Decode(format!(
                "StatusReport needs {} bytes, got {}",
                HEADER_LEN,
                data.len()
            )));
        }

        Ok(Self {
            general_code: u16::from_le_bytes([data[0], data[1]]),
            protocol_id: u32::from_le_bytes([data[2], data[3], data[4], data[5]]),
            protocol_code: u16::from_le_bytes([data[6], data[7]]),
            protocol_data: data[HEADER_LEN..].to_vec(),
        })
    }

    /// Serialize to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.protocol_data.len());
        buf.extend_from_slice(&self.general_code.to_le_bytes());
        buf.extend_from_slice(&self.protocol_id.to_le_bytes());
        buf.extend_from_slice(&self.protocol_code.to_le_bytes());
        buf.extend_from_slice(&self.protocol_data);
        buf
    }
}
