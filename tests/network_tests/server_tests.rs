//! Tests for Server
//!
//! These tests run a real acceptor on a loopback port and verify:
//! - Concurrent uploads never see each other's artifacts
//! - Admission control (max users, per-peer rate)
//! - SHUTDOWN scope: session-only versus whole server
//! - Idle sessions are drained on server shutdown

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use qrlink::audit::{AuditAction, MemoryAuditLog};
use qrlink::config::{Config, ShutdownScope};
use qrlink::decoder::Decoder;
use qrlink::network::RunningServer;
use qrlink::protocol::CLIENT_GREETING;
use qrlink::{Client, QrLinkError, Result, Server};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(temp: &TempDir) -> qrlink::config::ConfigBuilder {
    Config::builder()
        .bind_host("127.0.0.1")
        .port(0)
        .accept_poll_interval(Duration::from_millis(10))
        .rate_limit(100, Duration::from_secs(60))
        .max_users(10)
        .idle_timeout(Duration::from_secs(10))
        .artifact_dir(temp.path())
}

fn echo_decoder() -> Arc<dyn Decoder> {
    Arc::new(|path: &Path| -> Result<String> {
        Ok(String::from_utf8_lossy(&std::fs::read(path)?).into_owned())
    })
}

fn start(config: Config, audit: Arc<MemoryAuditLog>) -> RunningServer {
    Server::bind(config, echo_decoder(), audit)
        .unwrap()
        .spawn()
        .unwrap()
}

fn connect(server: &RunningServer) -> Client {
    let mut client = Client::connect(server.local_addr()).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    client.greet(CLIENT_GREETING).unwrap();
    client
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

// =============================================================================
// Uploads
// =============================================================================

#[test]
fn test_concurrent_uploads_are_isolated() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let server = start(test_config(&temp).build(), audit);

    let handles: Vec<_> = (0..4u8)
        .map(|i| {
            let addr = server.local_addr();
            thread::spawn(move || {
                let payload = vec![b'a' + i; 200_000 + i as usize * 1000];
                let mut client = Client::connect(addr).unwrap();
                client.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
                client.greet(CLIENT_GREETING).unwrap();

                for _ in 0..3 {
                    let reply = client.upload(&payload).unwrap();
                    assert_eq!(reply.into_result().unwrap(), payload);
                }
                client.close().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    server.stop().unwrap();

    let leftovers = std::fs::read_dir(temp.path()).unwrap().count();
    assert_eq!(leftovers, 0, "artifacts left behind");
}

#[test]
fn test_decode_error_reaches_client() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let decoder: Arc<dyn Decoder> = Arc::new(|_path: &Path| -> Result<String> {
        Err(QrLinkError::Decode("decoder exited with status 1".to_string()))
    });
    let server = Server::bind(test_config(&temp).build(), decoder, audit)
        .unwrap()
        .spawn()
        .unwrap();

    let mut client = connect(&server);
    let result = client.upload(b"not a qr code").unwrap().into_result();
    assert!(matches!(result, Err(QrLinkError::Remote(msg)) if msg.contains("status 1")));
    assert_eq!(client.close().unwrap(), qrlink::protocol::CLOSE_CONFIRMATION);

    server.stop().unwrap();
}

#[test]
fn test_oversized_upload_gets_error_reply() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let server = start(test_config(&temp).max_frame_size(16).build(), audit);

    let mut client = connect(&server);
    let reply = client.upload(&vec![7u8; 4 * 1024 * 1024]).unwrap();
    match reply.into_result() {
        Err(QrLinkError::Remote(msg)) => assert!(msg.contains("too large"), "{}", msg),
        other => panic!("Expected refusal, got {:?}", other),
    }
    assert!(client.is_closed_by_peer().unwrap());

    server.stop().unwrap();
}

// =============================================================================
// Admission Control
// =============================================================================

#[test]
fn test_max_users_rejects_then_recovers() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let server = start(test_config(&temp).max_users(1).build(), audit.clone());

    let mut first = connect(&server);

    match Client::connect(server.local_addr()) {
        Err(QrLinkError::Remote(msg)) => assert!(msg.contains("full"), "{}", msg),
        Err(e) => panic!("Expected rejection, got {:?}", e),
        Ok(_) => panic!("Expected rejection, got a session"),
    }
    assert!(audit.actions().contains(&AuditAction::Rejected));

    first.close().unwrap();

    // The permit is released once the worker finishes
    let admitted = wait_until(Duration::from_secs(3), || {
        Client::connect(server.local_addr()).is_ok()
    });
    assert!(admitted);

    server.stop().unwrap();
}

#[test]
fn test_rate_limit_per_peer() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let config = test_config(&temp)
        .rate_limit(2, Duration::from_secs(60))
        .build();
    let server = start(config, audit);

    for _ in 0..2 {
        let mut client = connect(&server);
        client.close().unwrap();
    }

    match Client::connect(server.local_addr()) {
        Err(QrLinkError::Remote(msg)) => assert!(msg.contains("rate limit"), "{}", msg),
        other => panic!("Expected rate limit rejection, got {:?}", other.map(|_| ())),
    }

    server.stop().unwrap();
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_server_scope_shutdown_drains_sessions() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let config = test_config(&temp)
        .shutdown_scope(ShutdownScope::Server)
        .build();
    let server = start(config, audit.clone());

    let mut idle = connect(&server);
    let mut requester = connect(&server);
    requester.shutdown().unwrap();

    assert!(wait_until(Duration::from_secs(5), || server.is_finished()));
    server.join().unwrap();

    assert!(idle.is_closed_by_peer().unwrap());
    assert!(requester.is_closed_by_peer().unwrap());

    let shutdowns = audit
        .actions()
        .into_iter()
        .filter(|a| *a == AuditAction::Shutdown)
        .count();
    assert_eq!(shutdowns, 2);
}

#[test]
fn test_server_scope_shutdown_drains_ungreeted_client() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let config = test_config(&temp)
        .idle_timeout(Duration::from_secs(6))
        .shutdown_scope(ShutdownScope::Server)
        .build();
    let server = start(config, audit);

    // Reads the banner but never greets
    let mut silent = Client::connect(server.local_addr()).unwrap();
    silent.set_read_timeout(Some(Duration::from_secs(10))).unwrap();

    let mut requester = connect(&server);
    let started = Instant::now();
    requester.shutdown().unwrap();

    assert!(wait_until(Duration::from_secs(5), || server.is_finished()));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "drain took {:?}",
        started.elapsed()
    );
    server.join().unwrap();
    assert!(silent.is_closed_by_peer().unwrap());
}

#[test]
fn test_session_scope_shutdown_keeps_serving() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let server = start(test_config(&temp).build(), audit);

    let mut requester = connect(&server);
    requester.shutdown().unwrap();
    assert!(requester.is_closed_by_peer().unwrap());

    thread::sleep(Duration::from_millis(100));
    assert!(!server.is_finished());

    let mut next = connect(&server);
    let reply = next.upload(b"still here").unwrap();
    assert_eq!(reply.into_result().unwrap(), b"still here");
    next.close().unwrap();

    server.stop().unwrap();
}

#[test]
fn test_stop_with_no_clients() {
    let temp = TempDir::new().unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let server = start(test_config(&temp).build(), audit);
    let addr = server.local_addr();

    server.stop().unwrap();

    assert!(Client::connect(addr).is_err());
}

#[test]
fn test_bind_rejects_invalid_config() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp).max_users(0).build();
    let result = Server::bind(config, echo_decoder(), Arc::new(MemoryAuditLog::new()));
    assert!(matches!(result, Err(QrLinkError::Config(_))));
}
