//! Config Tests
//!
//! These tests verify:
//! - Default limits and port
//! - Keyword options are parsed and validated
//! - Builder overrides

use std::time::Duration;

use qrlink::config::{frame_size_from_mb, Config, ShutdownScope, DEFAULT_PORT};
use qrlink::QrLinkError;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.rate_limit.max_connections, 3);
    assert_eq!(config.rate_limit.window, Duration::from_secs(60));
    assert_eq!(config.max_users, 3);
    assert_eq!(config.idle_timeout, Duration::from_secs(80));
    assert_eq!(config.shutdown_scope, ShutdownScope::Session);
    assert!(config.validate().is_ok());
}

#[test]
fn test_keyword_args_applied() {
    let mut config = Config::default();
    config
        .apply_keyword_args(["PORT", "3000", "RATE", "5", "30", "MAX_USERS", "8", "TIME_OUT", "15"])
        .unwrap();

    assert_eq!(config.port, 3000);
    assert_eq!(config.rate_limit.max_connections, 5);
    assert_eq!(config.rate_limit.window, Duration::from_secs(30));
    assert_eq!(config.max_users, 8);
    assert_eq!(config.idle_timeout, Duration::from_secs(15));
    assert_eq!(config.listen_addr(), "0.0.0.0:3000");
}

#[test]
fn test_keyword_args_case_insensitive() {
    let mut config = Config::default();
    config.apply_keyword_args(["time_out", "5"]).unwrap();
    assert_eq!(config.idle_timeout, Duration::from_secs(5));
}

#[test]
fn test_empty_keyword_args_keep_defaults() {
    let mut config = Config::default();
    config.apply_keyword_args(Vec::<String>::new()).unwrap();
    assert_eq!(config.port, DEFAULT_PORT);
}

#[test]
fn test_keyword_arg_errors() {
    let cases: Vec<Vec<&str>> = vec![
        vec!["PORT"],
        vec!["PORT", "http"],
        vec!["PORT", "70000"],
        vec!["RATE", "3"],
        vec!["RATE", "0", "60"],
        vec!["RATE", "3", "0"],
        vec!["MAX_USERS", "0"],
        vec!["TIME_OUT", "-1"],
        vec!["TIME_OUT", "0"],
        vec!["VERBOSE"],
    ];

    for args in cases {
        let mut config = Config::default();
        let result = config.apply_keyword_args(&args);
        assert!(
            matches!(result, Err(QrLinkError::Config(_))),
            "expected config error for {:?}",
            args
        );
    }
}

#[test]
fn test_builder_and_validate() {
    let config = Config::builder()
        .bind_host("127.0.0.1")
        .port(0)
        .max_users(10)
        .rate_limit(4, Duration::from_secs(1))
        .idle_timeout(Duration::from_millis(500))
        .transfer_timeout(None)
        .max_frame_size(1024)
        .shutdown_scope(ShutdownScope::Server)
        .build();

    assert_eq!(config.listen_addr(), "127.0.0.1:0");
    assert_eq!(config.transfer_timeout, None);
    assert!(config.validate().is_ok());

    let bad = Config::builder().max_users(0).build();
    assert!(matches!(bad.validate(), Err(QrLinkError::Config(_))));

    let bad = Config::builder().transfer_timeout(Some(Duration::ZERO)).build();
    assert!(bad.validate().is_err());
}

#[test]
fn test_shutdown_scope_parse() {
    assert_eq!("server".parse::<ShutdownScope>().unwrap(), ShutdownScope::Server);
    assert_eq!("Session".parse::<ShutdownScope>().unwrap(), ShutdownScope::Session);
    assert!("process".parse::<ShutdownScope>().is_err());
}

#[test]
fn test_frame_size_from_mb() {
    assert_eq!(frame_size_from_mb(16).unwrap(), 16 * 1024 * 1024);
    assert_eq!(frame_size_from_mb(0).unwrap(), 0);
    assert!(matches!(
        frame_size_from_mb(u64::MAX / 1024),
        Err(QrLinkError::Config(_))
    ));
}
