//! Decoder Tests
//!
//! These tests verify:
//! - Successful runs return stdout
//! - Non-zero exit and missing programs become decode errors, never empty text
//! - Closures can act as decoders

use std::path::Path;

use qrlink::decoder::{CommandDecoder, Decoder};
use qrlink::QrLinkError;
use tempfile::TempDir;

fn write_artifact(dir: &TempDir, content: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("artifact.img");
    std::fs::write(&path, content).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn test_command_output_is_result() {
    let temp = TempDir::new().unwrap();
    let path = write_artifact(&temp, b"https://example.com/qr\n");

    let decoder = CommandDecoder::from_command_line("cat {input}").unwrap();
    assert_eq!(decoder.decode(&path).unwrap(), "https://example.com/qr\n");
}

#[cfg(unix)]
#[test]
fn test_nonzero_exit_is_decode_error() {
    let temp = TempDir::new().unwrap();
    let path = write_artifact(&temp, b"not an image");

    // `false` ignores its argument and exits 1
    let decoder = CommandDecoder::new("false", vec![]);
    match decoder.decode(&path) {
        Err(QrLinkError::Decode(msg)) => assert!(msg.contains("false")),
        other => panic!("Expected Decode error, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_stderr_carried_into_error() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.img");

    let decoder = CommandDecoder::from_command_line("cat").unwrap();
    match decoder.decode(&missing) {
        Err(QrLinkError::Decode(msg)) => assert!(msg.contains("missing.img")),
        other => panic!("Expected Decode error, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_non_utf8_output_is_decode_error() {
    let temp = TempDir::new().unwrap();
    let path = write_artifact(&temp, b"QR\xff\xfepayload");

    let decoder = CommandDecoder::from_command_line("cat {input}").unwrap();
    match decoder.decode(&path) {
        Err(QrLinkError::Decode(msg)) => assert!(msg.contains("byte 2"), "{}", msg),
        other => panic!("Expected Decode error, got {:?}", other),
    }
}

#[test]
fn test_missing_program_is_decode_error() {
    let temp = TempDir::new().unwrap();
    let path = write_artifact(&temp, b"x");

    let decoder = CommandDecoder::new("qrlink-no-such-decoder-binary", vec![]);
    assert!(matches!(decoder.decode(&path), Err(QrLinkError::Decode(_))));
}

#[test]
fn test_closure_decoder() {
    let temp = TempDir::new().unwrap();
    let path = write_artifact(&temp, b"0123456789");

    let decoder = |path: &Path| -> qrlink::Result<String> {
        let len = std::fs::metadata(path)?.len();
        Ok(format!("{} bytes", len))
    };
    assert_eq!(decoder.decode(&path).unwrap(), "10 bytes");
}

#[test]
fn test_zxing_is_default() {
    assert_eq!(CommandDecoder::default().program(), "java");
}
