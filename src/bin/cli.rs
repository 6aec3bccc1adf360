//! QRLink CLI Client
//!
//! Connects to a QRLink server and reads commands from stdin:
//! `close`, `shutdown`, or the path of an image to decode.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use clap::Parser;
use qrlink::client::ClientInput;
use qrlink::config::DEFAULT_PORT;
use qrlink::protocol::CLIENT_GREETING;
use qrlink::{Client, QrLinkError};
use tracing_subscriber::{fmt, EnvFilter};

/// QRLink CLI
#[derive(Parser, Debug)]
#[command(name = "qrlink-cli")]
#[command(about = "Upload QR code images to a QRLink server")]
#[command(version)]
struct Args {
    /// Server hostname
    host: String,

    /// Image to upload right after connecting
    file: Option<PathBuf>,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let args = Args::parse();

    let mut client = match Client::connect((args.host.as_str(), args.port)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("client: failed to connect to {}:{}: {}", args.host, args.port, e);
            std::process::exit(2);
        }
    };

    println!("client: connected to {}", client.peer_addr());
    println!("client: received '{}'", client.banner());

    if let Err(e) = client.greet(CLIENT_GREETING) {
        eprintln!("client: greeting failed: {}", e);
        std::process::exit(1);
    }

    if let Some(file) = &args.file {
        if let Err(e) = upload(&mut client, file) {
            exit_on_connection_error(e);
        }
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("client: input error: {}", e);
                std::process::exit(1);
            }
        };

        for token in line.split_whitespace() {
            match ClientInput::parse(token) {
                Some(ClientInput::Close) => {
                    match client.close() {
                        Ok(confirmation) => println!("client: received '{}'", confirmation),
                        Err(e) => eprintln!("client: close failed: {}", e),
                    }
                    return;
                }
                Some(ClientInput::Shutdown) => {
                    if let Err(e) = client.shutdown() {
                        eprintln!("client: shutdown failed: {}", e);
                    }
                    println!("client: shutdown sent");
                    return;
                }
                Some(ClientInput::Upload(path)) => {
                    if let Err(e) = upload(&mut client, &path) {
                        exit_on_connection_error(e);
                    }
                }
                None => {}
            }
        }
    }
}

/// Upload one file and print the result
///
/// Local file problems and server-reported failures are printed and the
/// session continues; anything else is returned.
fn upload(client: &mut Client, path: &Path) -> qrlink::Result<()> {
    match client.upload_file(path).and_then(|reply| reply.into_result()) {
        Ok(text) => {
            println!("Received server bytes: {}", text.len());
            println!("QRCode Result:\n");
            println!("{}", String::from_utf8_lossy(&text).trim_end());
            Ok(())
        }
        Err(QrLinkError::Artifact(msg)) => {
            println!("Error: File not found ({})", msg);
            Ok(())
        }
        Err(QrLinkError::Remote(msg)) => {
            println!("Error: server could not decode {}: {}", path.display(), msg);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn exit_on_connection_error(e: QrLinkError) -> ! {
    eprintln!("client: connection error: {}", e);
    std::process::exit(1);
}
