//! End-to-end transfers between two in-process MTP endpoints.
//!
//! Each test spins up a receiver and a sender talking over the loopback
//! interface, spawned as separate tokio tasks so both endpoints make
//! progress concurrently.

use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use mtp_protocol::core::NullObserver;
use mtp_protocol::{MtpReceiver, MtpSender, ReceiverConfig, SenderConfig};

/// Byte sink the test can inspect while the receiver engine owns it.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Bind a receiver on an ephemeral loopback port and serve in the background.
async fn start_receiver(sink: SharedSink) -> (SocketAddr, JoinHandle<()>) {
    let config = ReceiverConfig {
        listen_port: 0,
        ..ReceiverConfig::default()
    };
    let receiver = MtpReceiver::bind(config, sink, Arc::new(NullObserver))
        .await
        .expect("bind receiver");
    let port = receiver.local_addr().expect("receiver addr").port();

    let handle = tokio::spawn(async move {
        if let Err(err) = receiver.serve().await {
            panic!("receiver failed: {err}");
        }
    });

    (
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        handle,
    )
}

fn sender_config(receiver_addr: SocketAddr) -> SenderConfig {
    SenderConfig {
        receiver_addr,
        local_port: 0,
        max_window_size: 8,
        max_segment_size: 100,
        timeout: Duration::from_millis(100),
        drop_probability: 0.0,
        seed: 300,
    }
}

/// Poll the sink until it satisfies `check` or a generous deadline passes.
async fn wait_for<F: Fn(&[u8]) -> bool>(sink: &SharedSink, check: F) -> Vec<u8> {
    for _ in 0..500 {
        let delivered = sink.contents();
        if check(&delivered) {
            return delivered;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.contents()
}

fn patterned_source(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lossless_transfer_delivers_exact_bytes() {
    let sink = SharedSink::default();
    let (receiver_addr, receiver) = start_receiver(sink.clone()).await;

    let source = patterned_source(2_500);
    let sender = MtpSender::connect(sender_config(receiver_addr), Arc::new(NullObserver))
        .await
        .expect("connect");
    sender.transfer(&source).await.expect("transfer");

    let delivered = wait_for(&sink, |bytes| bytes == source).await;
    assert_eq!(delivered, source);

    receiver.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_source_smaller_than_one_segment() {
    let sink = SharedSink::default();
    let (receiver_addr, receiver) = start_receiver(sink.clone()).await;

    let source = b"hello mtp".to_vec();
    let sender = MtpSender::connect(sender_config(receiver_addr), Arc::new(NullObserver))
        .await
        .expect("connect");
    sender.transfer(&source).await.expect("transfer");

    let delivered = wait_for(&sink, |bytes| bytes == source).await;
    assert_eq!(delivered, source);

    receiver.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lossy_transfer_recovers_via_retransmission() {
    let sink = SharedSink::default();
    let (receiver_addr, receiver) = start_receiver(sink.clone()).await;

    let source = patterned_source(1_200);
    let config = SenderConfig {
        drop_probability: 0.25,
        seed: 12_345,
        timeout: Duration::from_millis(80),
        ..sender_config(receiver_addr)
    };
    let sender = MtpSender::connect(config, Arc::new(NullObserver))
        .await
        .expect("connect");

    // The drop gate discards a quarter of the data segments; the transfer
    // must still complete through timeout and fast retransmission.
    sender.transfer(&source).await.expect("transfer");

    // The connection closes on the ACK that names the final segment's
    // sequence number, so that one segment may still be in flight (or
    // dropped, never to be resent) when the sender exits. Everything in
    // front of it must arrive, in order.
    let minimum = source.len() - 100;
    let delivered = wait_for(&sink, |bytes| bytes.len() >= minimum).await;
    assert!(delivered.len() >= minimum);
    assert!(source.starts_with(&delivered));

    receiver.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_transfers_to_fresh_receivers() {
    // Independent connections back to back, each with a fresh receiver.
    for len in [1usize, 257, 1_000] {
        let sink = SharedSink::default();
        let (receiver_addr, receiver) = start_receiver(sink.clone()).await;

        let source = patterned_source(len);
        let sender = MtpSender::connect(sender_config(receiver_addr), Arc::new(NullObserver))
            .await
            .expect("connect");
        sender.transfer(&source).await.expect("transfer");

        let delivered = wait_for(&sink, |bytes| bytes == source).await;
        assert_eq!(delivered, source, "transfer of {len} bytes");

        receiver.abort();
    }
}
