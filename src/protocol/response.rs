//! Reply definitions
//!
//! Represents the server's answer to an UPLOAD.

use crate::error::{QrLinkError, Result};

/// Reply status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Error = 0x01,
}

impl Status {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Status::Ok),
            0x01 => Ok(Status::Error),
            other => Err(QrLinkError::Protocol(format!(
                "Unknown reply status: 0x{:02x}",
                other
            ))),
        }
    }
}

/// A reply to an UPLOAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code
    pub status: Status,

    /// Decoded text for OK, error message for ERROR
    pub payload: Vec<u8>,
}

impl Reply {
    /// Create an OK reply carrying decoded text
    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload: payload.into(),
        }
    }

    /// Create an ERROR reply
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: message.as_bytes().to_vec(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Turn an ERROR reply into `QrLinkError::Remote`
    pub fn into_result(self) -> Result<Vec<u8>> {
        match self.status {
            Status::Ok => Ok(self.payload),
            Status::Error => Err(QrLinkError::Remote(
                String::from_utf8_lossy(&self.payload).into_owned(),
            )),
        }
    }
}
