//! Protocol codec
//!
//! Framed transfer primitives shared by client and server.
//!
//! ## Wire Format
//!
//! ### Frame
//! ```text
//! ┌──────────────┬─────────────────────────────┬──────────┐
//! │ Len (8, BE)  │         Body (Len)          │ CRC (4)  │
//! └──────────────┴─────────────────────────────┴──────────┘
//! ```
//! The CRC is CRC-32 (IEEE) of the body, big-endian.
//!
//! ### Line
//! UTF-8 text terminated by `\n`, at most `MAX_LINE_LEN` bytes.

use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::{Reply, Status};
use crate::error::{QrLinkError, Result};

/// Width of the length prefix
pub const LENGTH_FIELD_SIZE: usize = 8;

/// Width of the CRC trailer
pub const CHECKSUM_SIZE: usize = 4;

/// Bounded intermediate buffer used while receiving a frame body
pub const RECV_CHUNK_SIZE: usize = 4096;

/// Longest accepted text line, newline included
pub const MAX_LINE_LEN: usize = 512;

// =============================================================================
// Frame Encoding
// =============================================================================

/// Encode a complete frame to bytes
pub fn encode_frame(body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_SIZE + body.len() + CHECKSUM_SIZE);
    buf.put_u64(body.len() as u64);
    buf.put_slice(body);
    buf.put_u32(crc32fast::hash(body));
    buf.freeze()
}

/// Write a frame to a stream
///
/// The body is written to completion even if the transport accepts it in
/// several pieces.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<()> {
    writer.write_all(&(body.len() as u64).to_be_bytes())?;
    writer.write_all(body)?;
    writer.write_all(&crc32fast::hash(body).to_be_bytes())?;
    writer.flush()?;
    tracing::trace!("Sent frame of {} bytes", body.len());
    Ok(())
}

// =============================================================================
// Frame Decoding
// =============================================================================

/// Read a complete frame from a stream into memory
pub fn read_frame<R: Read>(reader: &mut R, max_len: u64) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    read_frame_into(reader, &mut body, max_len)?;
    Ok(body)
}

/// Read a frame, streaming its body into `sink`
///
/// Reads exactly the declared number of body bytes, never more, so whatever
/// follows the frame on the stream is left untouched. Returns the body length.
///
/// On a checksum mismatch the body has already been written to `sink`; the
/// caller owns it and must discard it.
pub fn read_frame_into<R: Read, W: Write>(
    reader: &mut R,
    sink: &mut W,
    max_len: u64,
) -> Result<u64> {
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    fill_exact(reader, &mut len_buf)?;
    let len = u64::from_be_bytes(len_buf);

    if len > max_len {
        return Err(QrLinkError::FrameTooLarge { len, max: max_len });
    }

    let mut hasher = crc32fast::Hasher::new();
    let mut chunk = [0u8; RECV_CHUNK_SIZE];
    let mut received: u64 = 0;

    while received < len {
        let want = (len - received).min(RECV_CHUNK_SIZE as u64) as usize;
        let n = match reader.read(&mut chunk[..want]) {
            Ok(0) => {
                return Err(QrLinkError::UnexpectedEof {
                    expected: len,
                    received,
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        hasher.update(&chunk[..n]);
        sink.write_all(&chunk[..n])
            .map_err(|e| QrLinkError::Artifact(e.to_string()))?;
        received += n as u64;
    }

    let mut crc_buf = [0u8; CHECKSUM_SIZE];
    fill_exact(reader, &mut crc_buf)?;
    let expected = u32::from_be_bytes(crc_buf);
    let actual = hasher.finalize();
    if expected != actual {
        return Err(QrLinkError::ChecksumMismatch { expected, actual });
    }

    tracing::trace!("Received frame of {} bytes", received);
    Ok(received)
}

/// Like `read_exact`, but reports how far it got before EOF
fn fill_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(QrLinkError::UnexpectedEof {
                    expected: buf.len() as u64,
                    received: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// =============================================================================
// Replies
// =============================================================================

/// Write a reply: status byte followed by a frame
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    writer.write_all(&[reply.status as u8])?;
    write_frame(writer, &reply.payload)
}

/// Read a reply written by `write_reply`
pub fn read_reply<R: Read>(reader: &mut R, max_len: u64) -> Result<Reply> {
    let mut status = [0u8; 1];
    fill_exact(reader, &mut status)?;
    let status = Status::from_byte(status[0])?;
    let payload = read_frame(reader, max_len)?;
    Ok(Reply { status, payload })
}

// =============================================================================
// Text Lines
// =============================================================================

/// Write one `\n`-terminated line
pub fn write_line<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    let text = text.trim_end_matches('\n');
    if text.len() + 1 > MAX_LINE_LEN {
        return Err(QrLinkError::Protocol(format!(
            "Line too long: {} bytes (max {})",
            text.len() + 1,
            MAX_LINE_LEN
        )));
    }
    writer.write_all(text.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read one `\n`-terminated line, without the terminator
///
/// Reads byte by byte so nothing past the newline is consumed. A trailing
/// `\r` is dropped. Invalid UTF-8 is replaced rather than rejected.
pub fn read_line<R: Read>(reader: &mut R, max_len: usize) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(QrLinkError::UnexpectedEof {
                    expected: line.len() as u64 + 1,
                    received: line.len() as u64,
                })
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        if byte[0] == b'\n' {
            break;
        }
        if line.len() + 1 >= max_len {
            return Err(QrLinkError::Protocol(format!(
                "Line exceeds {} bytes",
                max_len
            )));
        }
        line.push(byte[0]);
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
