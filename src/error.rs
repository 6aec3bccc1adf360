//! Error types for QRLink
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using QrLinkError
pub type Result<T> = std::result::Result<T, QrLinkError>;

/// Unified error type for QRLink operations
#[derive(Debug, Error)]
pub enum QrLinkError {
    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed after {received} of {expected} bytes")]
    UnexpectedEof { expected: u64, received: u64 },

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("Frame checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Server reported error: {0}")]
    Remote(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Audit Errors
    // -------------------------------------------------------------------------
    #[error("Audit log error: {0}")]
    Audit(String),
}

impl QrLinkError {
    /// Socket read/write failure
    pub fn is_transport(&self) -> bool {
        matches!(self, QrLinkError::Io(_))
    }

    /// Frame or command contract violation
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            QrLinkError::Protocol(_)
                | QrLinkError::UnexpectedEof { .. }
                | QrLinkError::FrameTooLarge { .. }
                | QrLinkError::ChecksumMismatch { .. }
        )
    }

    /// The peer went away (reset, abort, broken pipe or EOF)
    pub fn is_disconnect(&self) -> bool {
        match self {
            QrLinkError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            QrLinkError::UnexpectedEof { .. } => true,
            _ => false,
        }
    }

    /// A socket read or write timed out
    pub fn is_timeout(&self) -> bool {
        match self {
            QrLinkError::Io(e) => is_timeout_kind(e.kind()),
            _ => false,
        }
    }
}

/// Read timeouts surface as WouldBlock on Unix and TimedOut on Windows
pub(crate) fn is_timeout_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
