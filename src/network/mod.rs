//! Network Module
//!
//! TCP server and per-connection sessions.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - Admission control (max users, per-peer rate) at accept time
//! - One worker thread per admitted connection, running a `Session`
//! - Workers report completion over a channel and are joined by the acceptor

mod admission;
mod idle;
mod server;
mod session;
mod worker;

pub use admission::{Admission, AdmissionPermit, Rejection};
pub use idle::{IdleMonitor, MIN_READ_TIMEOUT};
pub use server::{RunningServer, Server, ShutdownHandle};
pub use session::{Session, SessionContext, SessionOutcome, SessionState};
pub use worker::{spawn_worker, WorkerRegistry};
