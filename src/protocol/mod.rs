//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Session Flow
//! ```text
//! server ── banner line ─────────────────────────▶ client
//! server ◀──────────────────────── greeting line ── client
//! server ◀──────────────────────── command byte ─── client   (repeats)
//! ```
//!
//! ### Commands (one ASCII digit)
//! - `'0'`: CLOSE    - server answers with a confirmation line and closes
//! - `'1'`: SHUTDOWN - server closes without answering
//! - `'2'`: UPLOAD   - client sends a frame, server answers with a reply
//! - anything else is a no-op
//!
//! ### Frame Format
//! ```text
//! ┌──────────────┬─────────────────────────────┬──────────┐
//! │ Len (8, BE)  │         Body (Len)          │ CRC (4)  │
//! └──────────────┴─────────────────────────────┴──────────┘
//! ```
//!
//! ### Reply Format
//! ```text
//! ┌──────────┬──────────────────────────────────────────────┐
//! │Status(1) │                 Frame                        │
//! └──────────┴──────────────────────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK    - body is the decoded text
//! - 0x01: ERROR - body is an error message

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Reply, Status};
pub use codec::{
    encode_frame, read_frame, read_frame_into, read_line, read_reply, write_frame,
    write_line, write_reply, CHECKSUM_SIZE, LENGTH_FIELD_SIZE, MAX_LINE_LEN, RECV_CHUNK_SIZE,
};

/// First line the server sends on an admitted connection
pub const BANNER: &str =
    "Enter 'close' to disconnect, 'shutdown' to end the session, or an image path to decode";

/// Line the server sends before closing on CLOSE
pub const CLOSE_CONFIRMATION: &str = "Connection closed";

/// Prefix of the line sent to a refused connection
pub const REJECTION_PREFIX: &str = "Rejected:";

/// Greeting line the client sends after the banner
pub const CLIENT_GREETING: &str = "Hello, Server!";
