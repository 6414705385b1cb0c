//! Entry point for `mtp-receiver`.
//!
//! Parses CLI arguments, opens the output file, and hands everything to
//! [`mtp_protocol::MtpReceiver`]. The receiver has no shutdown handshake;
//! the process runs until interrupted or a transport failure ends it.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mtp_protocol::core::LogWriterObserver;
use mtp_protocol::{MtpError, MtpReceiver, ReceiverConfig};

/// Receive a file from an MTP sender.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// UDP port to listen on.
    listen_port: u16,
    /// Where to write the received bytes.
    filename: PathBuf,
}

#[tokio::main]
async fn main() {
    // Set RUST_LOG to control verbosity.
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("mtp-receiver: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), MtpError> {
    let sink = File::create(&args.filename)?;
    let log = File::create("mtp_receiver_log.txt")?;
    let observer = Arc::new(LogWriterObserver::new(BufWriter::new(log)));

    let config = ReceiverConfig {
        listen_port: args.listen_port,
        ..ReceiverConfig::default()
    };

    let receiver = MtpReceiver::bind(config, sink, observer).await?;
    receiver.serve().await
}
