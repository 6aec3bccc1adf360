//! Client
//!
//! Blocking client for the QRLink protocol, used by `qrlink-cli` and tests.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{is_timeout_kind, QrLinkError, Result};
use crate::protocol::{
    read_line, read_reply, write_frame, write_line, Command, Reply, MAX_LINE_LEN,
    REJECTION_PREFIX,
};

/// Largest reply frame the client will accept
pub const DEFAULT_MAX_REPLY_SIZE: u64 = 16 * 1024 * 1024;

/// One token typed at the interactive prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput {
    Close,
    Shutdown,
    Upload(PathBuf),
}

impl ClientInput {
    /// `close`, `shutdown`, or anything else as a file to upload
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "" => None,
            "close" => Some(ClientInput::Close),
            "shutdown" => Some(ClientInput::Shutdown),
            path => Some(ClientInput::Upload(PathBuf::from(path))),
        }
    }
}

/// A connected client session
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer_addr: SocketAddr,
    banner: String,
    max_reply_size: u64,
}

impl Client {
    /// Connect and read the server banner
    ///
    /// A refusal from admission control is returned as `QrLinkError::Remote`.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream);

        let banner = read_line(&mut reader, MAX_LINE_LEN)?;
        if banner.starts_with(REJECTION_PREFIX) {
            return Err(QrLinkError::Remote(banner));
        }
        tracing::debug!("Connected to {}: {}", peer_addr, banner);

        Ok(Self {
            reader,
            writer,
            peer_addr,
            banner,
            max_reply_size: DEFAULT_MAX_REPLY_SIZE,
        })
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn set_max_reply_size(&mut self, size: u64) {
        self.max_reply_size = size;
    }

    /// Bound how long any read from the server may block
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send the greeting line
    pub fn greet(&mut self, text: &str) -> Result<()> {
        write_line(&mut self.writer, text)
    }

    /// Send a single command byte
    pub fn send_command(&mut self, command: Command) -> Result<()> {
        self.send_raw(command.to_byte())
    }

    /// Send an arbitrary byte in command position
    pub fn send_raw(&mut self, byte: u8) -> Result<()> {
        self.writer.write_all(&[byte])?;
        self.writer.flush()?;
        Ok(())
    }

    /// Upload an artifact and wait for the server's reply
    pub fn upload(&mut self, artifact: &[u8]) -> Result<Reply> {
        self.send_command(Command::Upload)?;
        if let Err(e) = write_frame(&mut self.writer, artifact) {
            // The server may refuse the frame early and reply before closing
            tracing::debug!("Upload interrupted: {}", e);
            return read_reply(&mut self.reader, self.max_reply_size).map_err(|_| e);
        }
        tracing::debug!("Sent {} byte artifact", artifact.len());
        read_reply(&mut self.reader, self.max_reply_size)
    }

    /// Upload the contents of a file
    ///
    /// Missing or empty files are refused locally without contacting the server.
    pub fn upload_file(&mut self, path: &Path) -> Result<Reply> {
        let artifact = std::fs::read(path)
            .map_err(|e| QrLinkError::Artifact(format!("{}: {}", path.display(), e)))?;
        if artifact.is_empty() {
            return Err(QrLinkError::Artifact(format!(
                "{}: file is empty",
                path.display()
            )));
        }
        self.upload(&artifact)
    }

    /// Send CLOSE and return the server's confirmation
    pub fn close(&mut self) -> Result<String> {
        self.send_command(Command::Close)?;
        read_line(&mut self.reader, MAX_LINE_LEN)
    }

    /// Send SHUTDOWN
    pub fn shutdown(&mut self) -> Result<()> {
        self.send_command(Command::Shutdown)
    }

    /// True once the server has closed its side (reads return EOF)
    pub fn is_closed_by_peer(&mut self) -> Result<bool> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte) {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(e) if is_timeout_kind(e.kind()) => Ok(false),
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => {
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }
}
