//! Entry point for `mtp-sender`.
//!
//! Parses CLI arguments, reads the outgoing file, and hands everything to
//! [`mtp_protocol::MtpSender`]. All protocol work lives in the library;
//! this binary owns only process setup (logging, argument parsing) and the
//! exit status.

use std::fs::File;
use std::io::BufWriter;
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use mtp_protocol::core::LogWriterObserver;
use mtp_protocol::{MtpError, MtpSender, SenderConfig};

/// Transfer a file to a listening MTP receiver.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Receiver host name or IP address.
    receiver_host: String,
    /// Receiver UDP port.
    receiver_port: u16,
    /// File to transfer.
    filename: PathBuf,
    /// Maximum window size in segments (MWS).
    max_window_size: u16,
    /// Maximum segment payload size in bytes (MSS).
    max_segment_size: u16,
    /// Retransmission timeout in milliseconds.
    timeout_ms: u64,
    /// Probability in [0, 1] that a droppable segment is discarded.
    drop_probability: f32,
    /// PRNG seed for the loss gate and the initial sequence number.
    seed: u64,
}

#[tokio::main]
async fn main() {
    // Set RUST_LOG to control verbosity.
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("mtp-sender: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), MtpError> {
    let receiver_addr = (args.receiver_host.as_str(), args.receiver_port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            MtpError::Config(format!("cannot resolve host {}", args.receiver_host))
        })?;

    let source = std::fs::read(&args.filename)?;
    let log = File::create("mtp_sender_log.txt")?;
    let observer = Arc::new(LogWriterObserver::new(BufWriter::new(log)));

    let config = SenderConfig {
        receiver_addr,
        max_window_size: args.max_window_size,
        max_segment_size: args.max_segment_size,
        timeout: Duration::from_millis(args.timeout_ms),
        drop_probability: args.drop_probability,
        seed: args.seed,
        ..SenderConfig::default()
    };

    let sender = MtpSender::connect(config, observer).await?;
    sender.transfer(&source).await
}
