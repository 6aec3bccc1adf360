//! # QRLink
//!
//! A small TCP service that decodes QR code images:
//! - Length-prefixed, checksummed frame transfer in both directions
//! - One-byte command protocol (close / shutdown / upload)
//! - One worker thread per connection with an idle timeout
//! - Admission control (max users, per-peer connection rate)
//! - Append-only audit log of session events
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Acceptor                            │
//! │              (Admission: users / rate)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ one worker thread per connection
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Session (Dispatcher)                         │
//! │        GREETING → ACTIVE → UPLOADING / CLOSING ...           │
//! └──────┬───────────────────────┬──────────────────────┬───────┘
//!        │                       │                      │
//!        ▼                       ▼                      ▼
//!   ┌──────────┐          ┌─────────────┐        ┌─────────────┐
//!   │  Frames  │          │   Decoder   │        │  Audit Log  │
//!   │ (codec)  │          │ (external)  │        │  (append)   │
//!   └──────────┘          └─────────────┘        └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod audit;
pub mod client;
pub mod decoder;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{QrLinkError, Result};
pub use config::Config;
pub use client::Client;
pub use network::Server;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of QRLink
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
