//! QRLink Server Binary
//!
//! Starts the TCP server for QRLink.
//!
//! Limits are given as keyword options, for example:
//! ```text
//! qrlink-server PORT 2012 RATE 3 60 MAX_USERS 3 TIME_OUT 80
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use qrlink::audit::FileAuditLog;
use qrlink::config::{frame_size_from_mb, ShutdownScope};
use qrlink::decoder::CommandDecoder;
use qrlink::{Config, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// QRLink Server
#[derive(Parser, Debug)]
#[command(name = "qrlink-server")]
#[command(about = "Receives images over TCP and returns the decoded QR text")]
#[command(version)]
struct Args {
    /// Host or interface to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Audit log file
    #[arg(short, long, default_value = "log.txt")]
    log_file: String,

    /// Directory for temporary uploaded artifacts (defaults to the system temp dir)
    #[arg(short, long)]
    artifact_dir: Option<String>,

    /// Decoder command line; {input} is replaced by the artifact path
    #[arg(short, long)]
    decoder: Option<String>,

    /// What SHUTDOWN stops: "session" or "server"
    #[arg(short, long, default_value = "session")]
    shutdown_scope: ShutdownScope,

    /// Largest accepted upload in MB
    #[arg(short = 'm', long, default_value = "16")]
    max_frame_mb: u64,

    /// Per read/write timeout during a transfer, in seconds (0 disables)
    #[arg(short, long, default_value = "30")]
    transfer_timeout: u64,

    /// Keyword options: PORT <port>, RATE <count> <seconds>, MAX_USERS <n>, TIME_OUT <seconds>
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    options: Vec<String>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,qrlink=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("QRLink Server v{}", qrlink::VERSION);

    // Build config from args
    let max_frame_size = match frame_size_from_mb(args.max_frame_mb) {
        Ok(size) => size,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    };
    let transfer_timeout =
        (args.transfer_timeout > 0).then(|| Duration::from_secs(args.transfer_timeout));
    let mut builder = Config::builder()
        .bind_host(&args.bind)
        .log_path(&args.log_file)
        .shutdown_scope(args.shutdown_scope)
        .max_frame_size(max_frame_size)
        .transfer_timeout(transfer_timeout);
    if let Some(dir) = &args.artifact_dir {
        builder = builder.artifact_dir(dir);
    }
    let mut config = builder.build();

    if let Err(e) = config.apply_keyword_args(&args.options) {
        tracing::error!("{}", e);
        std::process::exit(2);
    }

    let decoder = match &args.decoder {
        Some(line) => match CommandDecoder::from_command_line(line) {
            Ok(decoder) => decoder,
            Err(e) => {
                tracing::error!("{}", e);
                std::process::exit(2);
            }
        },
        None => CommandDecoder::zxing(),
    };
    tracing::info!("Decoder: {}", decoder.program());

    let audit = match FileAuditLog::open(&config.log_path) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::error!("Failed to open audit log {}: {}", config.log_path.display(), e);
            std::process::exit(1);
        }
    };
    tracing::info!("Audit log: {}", audit.path().display());

    // Start server
    let server = match Server::bind(config, Arc::new(decoder), audit) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
