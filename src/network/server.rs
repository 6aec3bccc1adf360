//! TCP Server
//!
//! Accepts connections, applies admission control, and dispatches each
//! admitted connection to its own worker thread.

use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audit::{record_or_warn, AuditAction, AuditEntry, AuditSink};
use crate::config::Config;
use crate::decoder::Decoder;
use crate::error::{QrLinkError, Result};
use crate::protocol::{write_line, REJECTION_PREFIX};

use super::admission::Admission;
use super::session::SessionContext;
use super::worker::{spawn_worker, WorkerRegistry};

/// Bound on writing the refusal line to a rejected peer
const REJECTION_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared flag asking the acceptor to stop
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to stop accepting and drain its sessions
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// TCP server for QRLink
pub struct Server {
    config: Arc<Config>,
    listener: TcpListener,
    local_addr: SocketAddr,
    admission: Admission,
    context: SessionContext,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind the listening socket
    ///
    /// Bind failures are returned here; nothing is retried.
    pub fn bind(
        config: Config,
        decoder: Arc<dyn Decoder>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate()?;

        let listen_addr = config.listen_addr();
        let listener = TcpListener::bind(&listen_addr).map_err(|e| {
            QrLinkError::Io(io::Error::new(
                e.kind(),
                format!("failed to bind {}: {}", listen_addr, e),
            ))
        })?;
        // Non-blocking so the accept loop can notice a shutdown request
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let config = Arc::new(config);
        let shutdown = ShutdownHandle::new();
        let context = SessionContext {
            config: Arc::clone(&config),
            decoder,
            audit,
            shutdown: shutdown.clone(),
        };

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            admission: Admission::from_config(&config),
            config,
            listener,
            local_addr,
            context,
            shutdown,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Start the server (blocking)
    ///
    /// Returns once shutdown has been requested and every worker has finished.
    pub fn run(self) -> Result<()> {
        let mut workers = WorkerRegistry::new();
        let mut next_id: u64 = 1;

        tracing::info!(
            "Accepting connections (max users {}, rate {} per {:?}, idle timeout {:?})",
            self.config.max_users,
            self.config.rate_limit.max_connections,
            self.config.rate_limit.window,
            self.config.idle_timeout
        );

        while !self.shutdown.is_triggered() {
            workers.reap();

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let id = next_id;
                    next_id += 1;
                    if let Some(handle) = self.handle_incoming(id, stream, peer, &workers) {
                        workers.insert(id, handle);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(self.config.accept_poll_interval);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(self.config.accept_poll_interval);
                }
            }
        }

        tracing::info!("Shutting down, draining {} sessions", workers.len());
        drop(self.listener);

        workers.drain();

        tracing::info!("Server stopped");
        Ok(())
    }

    /// Run the accept loop on a background thread
    pub fn spawn(self) -> Result<RunningServer> {
        let local_addr = self.local_addr;
        let shutdown = self.shutdown.clone();
        let handle = thread::Builder::new()
            .name("qrlink-acceptor".to_string())
            .spawn(move || self.run())?;

        Ok(RunningServer {
            local_addr,
            shutdown,
            handle,
        })
    }

    /// Admit or refuse one accepted connection
    fn handle_incoming(
        &self,
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        workers: &WorkerRegistry,
    ) -> Option<JoinHandle<()>> {
        let audit = self.context.audit.as_ref();

        // Accepted sockets may inherit the listener's non-blocking mode
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Failed to configure connection from {}: {}", peer, e);
            return None;
        }

        let permit = match self.admission.try_admit(peer.ip()) {
            Ok(permit) => permit,
            Err(rejection) => {
                tracing::info!("Rejected {}: {}", peer, rejection);
                record_or_warn(
                    audit,
                    AuditEntry::new(AuditAction::Rejected, peer.to_string())
                        .with_detail(rejection.to_string()),
                );
                refuse(stream, &format!("{} {}", REJECTION_PREFIX, rejection));
                return None;
            }
        };

        tracing::info!("Connected to {} (session {})", peer, id);
        record_or_warn(
            audit,
            AuditEntry::new(AuditAction::Connect, peer.to_string()).with_session(id),
        );

        let done = workers.completion_sender();
        match spawn_worker(id, stream, peer, permit, self.context.clone(), done) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Failed to spawn worker for {}: {}", peer, e);
                None
            }
        }
    }
}

fn refuse(mut stream: TcpStream, message: &str) {
    let _ = stream.set_write_timeout(Some(REJECTION_WRITE_TIMEOUT));
    let _ = write_line(&mut stream, message);
    let _ = stream.shutdown(Shutdown::Both);
}

/// A server running on a background thread
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    handle: JoinHandle<Result<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Whether the accept loop has returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request shutdown and wait for the drain to finish
    pub fn stop(self) -> Result<()> {
        self.shutdown.trigger();
        self.join()
    }

    /// Wait for the accept loop to return on its own
    pub fn join(self) -> Result<()> {
        self.handle.join().map_err(|_| {
            QrLinkError::Io(io::Error::new(ErrorKind::Other, "acceptor thread panicked"))
        })?
    }
}
