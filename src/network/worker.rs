//! Session Worker
//!
//! One OS thread per admitted connection, running a `Session` to completion.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::audit::{record_or_warn, AuditAction, AuditEntry};

use super::admission::AdmissionPermit;
use super::session::{Session, SessionContext};

/// Start a worker thread for `stream`
///
/// The permit is released when the session ends, and the session id is sent
/// on `done` so the acceptor can join the thread.
pub fn spawn_worker(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    permit: AdmissionPermit,
    ctx: SessionContext,
    done: Sender<u64>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("qrlink-session-{}", id))
        .spawn(move || {
            run_session(id, stream, peer, ctx);
            drop(permit);
            // The acceptor may already be gone during drain
            let _ = done.send(id);
        })
}

fn run_session(id: u64, stream: TcpStream, peer: SocketAddr, ctx: SessionContext) {
    let audit = ctx.audit.clone();

    let mut session = match Session::new(stream, id, ctx) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Failed to set up session {} for {}: {}", id, peer, e);
            return;
        }
    };

    match session.run() {
        Ok(_) => {}
        Err(e) if e.is_disconnect() => {
            tracing::debug!("Client {} disconnected: {}", peer, e);
            record_or_warn(
                audit.as_ref(),
                AuditEntry::new(AuditAction::Disconnect, peer.to_string())
                    .with_session(id)
                    .with_detail(e.to_string()),
            );
        }
        Err(e) => {
            tracing::warn!("Session {} with {} failed: {}", id, peer, e);
            record_or_warn(
                audit.as_ref(),
                AuditEntry::new(AuditAction::Error, peer.to_string())
                    .with_session(id)
                    .with_detail(e.to_string()),
            );
        }
    }
}

/// Worker threads owned by the acceptor
///
/// Workers report their id on a channel when they finish; `reap` joins
/// them. `Server::run` registers each handle before its next `reap`, but the
/// registry is public and other callers may reap between `spawn_worker` and
/// `insert`. Ids reported before their handle arrives are kept until
/// `insert` sees it, so no worker is left unjoined.
pub struct WorkerRegistry {
    running: HashMap<u64, JoinHandle<()>>,

    /// Completions reported before `insert`
    finished_early: HashSet<u64>,
    done_tx: Sender<u64>,
    done_rx: Receiver<u64>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        let (done_tx, done_rx) = channel::unbounded();
        Self {
            running: HashMap::new(),
            finished_early: HashSet::new(),
            done_tx,
            done_rx,
        }
    }

    /// Sender handed to each new worker
    pub fn completion_sender(&self) -> Sender<u64> {
        self.done_tx.clone()
    }

    pub fn insert(&mut self, id: u64, handle: JoinHandle<()>) {
        if self.finished_early.remove(&id) {
            join_worker(id, handle);
        } else {
            self.running.insert(id, handle);
        }
    }

    /// Join every worker that has reported completion; returns how many
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        for id in self.done_rx.try_iter() {
            match self.running.remove(&id) {
                Some(handle) => {
                    join_worker(id, handle);
                    reaped += 1;
                }
                None => {
                    self.finished_early.insert(id);
                }
            }
        }
        reaped
    }

    /// Workers not yet joined
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Wait for every remaining worker
    pub fn drain(&mut self) {
        for (id, handle) in self.running.drain() {
            join_worker(id, handle);
        }
        self.finished_early.clear();
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn join_worker(id: u64, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::warn!("Session {} worker panicked", id);
    }
}
