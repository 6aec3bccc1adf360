//! Session
//!
//! Per-connection command dispatcher.
//!
//! ## State Machine
//! ```text
//! GREETING ──▶ ACTIVE ──┬──▶ UPLOADING ──▶ ACTIVE
//!                       ├──▶ CLOSING ──────▶ TERMINATED
//!                       ├──▶ SHUTTING_DOWN ▶ TERMINATED
//!                       └──(idle timeout / EOF / drain)──▶ TERMINATED
//! ```
//!
//! A session handles one command, and at most one frame, at a time.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{record_or_warn, AuditAction, AuditEntry, AuditSink};
use crate::config::{Config, ShutdownScope};
use crate::decoder::Decoder;
use crate::error::{is_timeout_kind, QrLinkError, Result};
use crate::protocol::{
    read_frame_into, write_line, write_reply, Command, Reply, BANNER, CLOSE_CONFIRMATION,
    MAX_LINE_LEN, RECV_CHUNK_SIZE,
};

use super::idle::IdleMonitor;
use super::server::ShutdownHandle;

/// Longest single wait for a greeting or command byte, so a server-wide shutdown is seen
const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(200);

/// How long a refused upload's remaining bytes are read and dropped
const REFUSAL_LINGER: Duration = Duration::from_secs(2);

/// Everything a session shares with the rest of the server
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<Config>,
    pub decoder: Arc<dyn Decoder>,
    pub audit: Arc<dyn AuditSink>,
    pub shutdown: ShutdownHandle,
}

/// Dispatcher states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Greeting,
    Active,
    Uploading,
    ShuttingDown,
    Closing,
    Terminated,
}

/// How a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Client sent CLOSE and got a confirmation
    Closed,

    /// Client sent SHUTDOWN
    Shutdown,

    /// Idle timeout expired while waiting for the greeting or a command
    TimedOut,

    /// Client went away while the session was waiting
    Disconnected,

    /// Server-wide shutdown ended the session while it was waiting
    Drained,
}

enum Wait {
    Command(Command),
    TimedOut,
    Eof,
    Drain,
}

/// Handles a single client connection
pub struct Session {
    id: u64,

    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Peer address for logging
    peer_addr: String,

    created_at: Instant,
    last_activity: Instant,
    state: SessionState,
    idle: IdleMonitor,
    uploads: u64,
    ctx: SessionContext,
}

impl Session {
    /// Create a new session for an accepted connection
    pub fn new(stream: TcpStream, id: u64, ctx: SessionContext) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm so single command bytes go out at once
        stream.set_nodelay(true)?;
        stream.set_write_timeout(ctx.config.transfer_timeout)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;
        let now = Instant::now();

        Ok(Self {
            id,
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            peer_addr,
            created_at: now,
            last_activity: now,
            state: SessionState::Greeting,
            idle: IdleMonitor::new(ctx.config.idle_timeout),
            uploads: 0,
            ctx,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Uploads answered so far
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Drive the session until it terminates (blocking)
    ///
    /// The connection is closed on every path out, including errors.
    pub fn run(&mut self) -> Result<SessionOutcome> {
        tracing::debug!("Session {} established from {}", self.id, self.peer_addr);

        let result = self.dispatch();
        self.transition(SessionState::Terminated);
        self.close_stream();

        if let Ok(outcome) = &result {
            tracing::debug!(
                "Session {} from {} ended: {:?} after {:?}",
                self.id,
                self.peer_addr,
                outcome,
                self.created_at.elapsed()
            );
        }
        result
    }

    fn dispatch(&mut self) -> Result<SessionOutcome> {
        if let Some(outcome) = self.greet()? {
            return Ok(outcome);
        }

        loop {
            self.enter_active();

            let command = match self.wait_for_command()? {
                Wait::Command(command) => command,
                Wait::TimedOut => {
                    tracing::info!("Session {} from {} timed out", self.id, self.peer_addr);
                    self.audit(AuditAction::Timeout, None);
                    return Ok(SessionOutcome::TimedOut);
                }
                Wait::Eof => {
                    self.audit(AuditAction::Disconnect, None);
                    return Ok(SessionOutcome::Disconnected);
                }
                Wait::Drain => {
                    self.audit(AuditAction::Shutdown, Some("server shutdown".to_string()));
                    return Ok(SessionOutcome::Drained);
                }
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);

            match command {
                Command::Close => {
                    self.transition(SessionState::Closing);
                    write_line(&mut self.writer, CLOSE_CONFIRMATION)?;
                    self.audit(AuditAction::Close, None);
                    return Ok(SessionOutcome::Closed);
                }
                Command::Shutdown => {
                    self.transition(SessionState::ShuttingDown);
                    self.audit(AuditAction::Shutdown, None);
                    if self.ctx.config.shutdown_scope == ShutdownScope::Server {
                        tracing::info!("Server shutdown requested by {}", self.peer_addr);
                        self.ctx.shutdown.trigger();
                    }
                    return Ok(SessionOutcome::Shutdown);
                }
                Command::Upload => self.handle_upload()?,
                // wait_for_command swallows these
                Command::Noop { .. } => {}
            }
        }
    }

    /// Send the banner and read the peer's greeting
    ///
    /// Returns an outcome if the session ended before becoming active.
    fn greet(&mut self) -> Result<Option<SessionOutcome>> {
        self.transition(SessionState::Greeting);
        write_line(&mut self.writer, BANNER)?;

        // One deadline for the whole line, however slowly it trickles in
        self.idle.arm();
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if self.ctx.shutdown.is_triggered() {
                self.audit(AuditAction::Shutdown, Some("server shutdown".to_string()));
                return Ok(Some(SessionOutcome::Drained));
            }

            let Some(timeout) = self.idle.next_read_timeout() else {
                tracing::info!("Session {} from {} never greeted", self.id, self.peer_addr);
                self.audit(AuditAction::Timeout, Some("no greeting".to_string()));
                return Ok(Some(SessionOutcome::TimedOut));
            };
            self.reader
                .get_ref()
                .set_read_timeout(Some(timeout.min(DRAIN_CHECK_INTERVAL)))?;

            match self.reader.read(&mut byte) {
                Ok(0) => {
                    self.audit(AuditAction::Disconnect, Some("closed before greeting".to_string()));
                    return Ok(Some(SessionOutcome::Disconnected));
                }
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => {
                    if line.len() + 1 >= MAX_LINE_LEN {
                        return Err(QrLinkError::Protocol(format!(
                            "Greeting exceeds {} bytes",
                            MAX_LINE_LEN
                        )));
                    }
                    line.push(byte[0]);
                }
                Err(e) if is_timeout_kind(e.kind()) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let greeting = String::from_utf8_lossy(&line).into_owned();
        tracing::debug!("Session {} greeting: {:?}", self.id, greeting);
        self.last_activity = Instant::now();
        self.audit(AuditAction::Greeting, Some(greeting));
        Ok(None)
    }

    fn enter_active(&mut self) {
        self.transition(SessionState::Active);
        self.idle.arm();
    }

    /// Block until a command byte arrives or the idle deadline passes
    ///
    /// Unrecognized bytes are skipped without re-arming the deadline.
    fn wait_for_command(&mut self) -> Result<Wait> {
        let mut byte = [0u8; 1];

        loop {
            if self.ctx.shutdown.is_triggered() {
                return Ok(Wait::Drain);
            }

            let Some(timeout) = self.idle.next_read_timeout() else {
                return Ok(Wait::TimedOut);
            };
            self.reader
                .get_ref()
                .set_read_timeout(Some(timeout.min(DRAIN_CHECK_INTERVAL)))?;

            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(Wait::Eof),
                Ok(_) => {
                    self.last_activity = Instant::now();
                    let command = Command::from_byte(byte[0]);
                    if let Command::Noop { byte } = command {
                        tracing::debug!(
                            "Session {} ignoring unknown command byte 0x{:02x}",
                            self.id,
                            byte
                        );
                        continue;
                    }
                    return Ok(Wait::Command(command));
                }
                Err(e) if is_timeout_kind(e.kind()) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receive one artifact, decode it, send the reply
    fn handle_upload(&mut self) -> Result<()> {
        self.transition(SessionState::Uploading);
        self.audit(AuditAction::UploadStart, None);

        let config = Arc::clone(&self.ctx.config);
        self.reader.get_ref().set_read_timeout(config.transfer_timeout)?;

        let artifact = tempfile::Builder::new()
            .prefix(&format!("qrlink-{}-", self.id))
            .suffix(".img")
            .tempfile_in(&config.artifact_dir);

        let mut artifact = match artifact {
            Ok(file) => file,
            Err(e) => {
                // Still consume the frame so the stream stays in sync
                let err = QrLinkError::Artifact(format!(
                    "cannot create artifact in {}: {}",
                    config.artifact_dir.display(),
                    e
                ));
                tracing::warn!("Session {}: {}", self.id, err);
                read_frame_into(&mut self.reader, &mut std::io::sink(), config.max_frame_size)?;
                self.audit(AuditAction::UploadFailed, Some(err.to_string()));
                return self.send_reply(Reply::error(&err.to_string()));
            }
        };

        let received = match read_frame_into(
            &mut self.reader,
            artifact.as_file_mut(),
            config.max_frame_size,
        ) {
            Ok(received) => received,
            Err(e) => {
                self.audit(AuditAction::UploadFailed, Some(e.to_string()));
                if let QrLinkError::FrameTooLarge { .. } = e {
                    if write_reply(&mut self.writer, &Reply::error(&e.to_string())).is_ok() {
                        self.discard_remaining_input();
                    }
                }
                return Err(e);
            }
        };
        artifact.as_file_mut().flush()?;
        self.last_activity = Instant::now();

        tracing::debug!(
            "Session {} received {} byte artifact at {}",
            self.id,
            received,
            artifact.path().display()
        );

        let reply = match self.ctx.decoder.decode(artifact.path()) {
            Ok(text) => {
                self.audit(AuditAction::UploadComplete, Some(format!("{} bytes", received)));
                Reply::ok(text)
            }
            Err(e) => {
                tracing::warn!("Session {} decode failed: {}", self.id, e);
                self.audit(AuditAction::UploadFailed, Some(e.to_string()));
                Reply::error(&e.to_string())
            }
        };
        drop(artifact);

        self.send_reply(reply)
    }

    fn send_reply(&mut self, reply: Reply) -> Result<()> {
        write_reply(&mut self.writer, &reply)?;
        self.uploads += 1;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Half-close, then drop whatever the peer is still sending
    ///
    /// Closing with unread input resets the connection, and the peer would
    /// lose the reply just written. Bounded by `REFUSAL_LINGER`.
    fn discard_remaining_input(&mut self) {
        if self.writer.get_ref().shutdown(Shutdown::Write).is_err() {
            return;
        }

        let deadline = Instant::now() + REFUSAL_LINGER;
        let mut scratch = vec![0u8; RECV_CHUNK_SIZE];
        let mut discarded: u64 = 0;

        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            if left.is_zero() || self.reader.get_ref().set_read_timeout(Some(left)).is_err() {
                break;
            }
            match self.reader.read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => discarded += n as u64,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        tracing::trace!("Session {} discarded {} bytes after refusal", self.id, discarded);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::trace!("Session {} {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }

    fn audit(&self, action: AuditAction, detail: Option<String>) {
        let mut entry = AuditEntry::new(action, self.peer_addr.as_str()).with_session(self.id);
        if let Some(detail) = detail {
            entry = entry.with_detail(detail);
        }
        record_or_warn(self.ctx.audit.as_ref(), entry);
    }

    fn close_stream(&mut self) {
        let _ = self.writer.flush();
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}
