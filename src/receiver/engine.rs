//! Ordered-delivery engine.
//!
//! Two concurrent flows share the connection state:
//!
//! - the **receive loop** classifies every incoming segment against the
//!   expected sequence number: deliver in-order payload to the sink,
//!   buffer what arrived ahead, re-ACK what is stale;
//! - the **drain loop** flushes runs of buffered segments the moment the
//!   gap in front of them closes, answering a whole run with one
//!   accumulated ACK instead of one per segment.
//!
//! When an in-order segment closes the gap to the buffer head, its
//! individual ACK is withheld on purpose and the drain loop's accumulated
//! ACK speaks for the entire run.

use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::constants::DRAIN_POLL_INTERVAL;
use crate::core::error::MtpError;
use crate::core::event::{EventObserver, EventReporter, SegmentEvent};
use crate::core::seq::next_seq;
use crate::transport::socket::MtpSocket;
use crate::wire::header::{HEADER_SIZE, SegmentHeader};
use crate::wire::segment;

use super::ReceiverConfig;
use super::buffer::{ReorderBuffer, ReorderEntry};
use super::handshake::{self, AcceptedLink};

/// An MTP receiver endpoint.
///
/// [`MtpReceiver::bind`] claims the listen socket; [`MtpReceiver::serve`]
/// waits for one sender, then delivers its stream to the sink indefinitely.
pub struct MtpReceiver<W: Write + Send + 'static> {
    config: ReceiverConfig,
    socket: MtpSocket,
    local_port: u16,
    reporter: EventReporter,
    sink: W,
}

impl<W: Write + Send + 'static> MtpReceiver<W> {
    /// Bind the listen socket. No handshake happens yet.
    pub async fn bind(
        config: ReceiverConfig,
        sink: W,
        observer: Arc<dyn EventObserver>,
    ) -> Result<Self, MtpError> {
        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.listen_port);
        let socket = MtpSocket::bind(local).await?;
        let local_port = socket.local_addr()?.port();

        Ok(Self {
            config,
            socket,
            local_port,
            reporter: EventReporter::new(observer),
            sink,
        })
    }

    /// The receiver's bound local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Accept one sender and deliver its byte stream to the sink.
    ///
    /// The receiver has no shutdown handshake of its own; this future runs
    /// until the surrounding task is dropped or a transport or sink failure
    /// makes it return `Err`.
    pub async fn serve(self) -> Result<(), MtpError> {
        let link =
            handshake::accept(&self.socket, self.local_port, self.config.seed, &self.reporter)
                .await?;
        debug!(mss = link.mss, mws = link.mws, "starting delivery loops");

        let shared = ReceiverShared {
            sequence_number: link.seq,
            ack_number: link.ack_num,
            buffer: ReorderBuffer::new(),
            sink: self.sink,
        };
        let ctx = ReceiverCtx {
            shared: Arc::new(Mutex::new(shared)),
            socket: self.socket.clone(),
            link,
            local_port: self.local_port,
            reporter: self.reporter.clone(),
        };

        tokio::try_join!(recv_loop(ctx.clone()), drain_loop(ctx.clone()))?;
        Ok(())
    }
}

/// Connection state shared by the receive and drain loops.
struct ReceiverShared<W> {
    /// The receiver's own sequence number, echoed in every ACK.
    sequence_number: u32,
    /// Next sequence number expected from the sender.
    ack_number: u32,
    buffer: ReorderBuffer,
    sink: W,
}

/// Cloneable handle giving each flow access to the shared state and socket.
struct ReceiverCtx<W> {
    shared: Arc<Mutex<ReceiverShared<W>>>,
    socket: MtpSocket,
    link: AcceptedLink,
    local_port: u16,
    reporter: EventReporter,
}

impl<W> Clone for ReceiverCtx<W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            socket: self.socket.clone(),
            link: self.link,
            local_port: self.local_port,
            reporter: self.reporter.clone(),
        }
    }
}

/// How the receive flow handled one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Expected segment, delivered. `reply` is `None` when the ACK is
    /// withheld because the buffer head continues the run.
    InOrder { reply: Option<SegmentHeader> },
    /// Ahead of the expected sequence number; buffered, duplicate ACK sent.
    Buffered { reply: SegmentHeader },
    /// Behind the expected sequence number; duplicate ACK sent, not
    /// delivered again.
    Stale { reply: SegmentHeader },
}

fn ack_header(seq: u32, ack_num: u32, local_port: u16, peer_port: u16) -> SegmentHeader {
    SegmentHeader {
        syn: false,
        ack: true,
        dest_port: peer_port,
        src_port: local_port,
        seq,
        ack_num,
        mss: 0,
        mws: 0,
        payload_len: 0,
    }
}

/// Classify one incoming segment and update the connection state.
fn handle_segment<W: Write>(
    s: &mut ReceiverShared<W>,
    header: &SegmentHeader,
    payload: &[u8],
    local_port: u16,
    peer_port: u16,
) -> std::io::Result<Disposition> {
    let expected = s.ack_number;

    if header.seq == expected {
        s.sink.write_all(payload)?;
        s.sink.flush()?;
        let new_ack = next_seq(header.seq, payload.len() as u32);
        s.ack_number = new_ack;

        if s.buffer.peek().map(|entry| entry.seq) == Some(new_ack) {
            // The buffer continues the stream; let the drain loop answer
            // the whole run with one accumulated ACK.
            Ok(Disposition::InOrder { reply: None })
        } else {
            Ok(Disposition::InOrder {
                reply: Some(ack_header(s.sequence_number, new_ack, local_port, peer_port)),
            })
        }
    } else if header.seq > expected {
        s.buffer.insert(ReorderEntry {
            seq: header.seq,
            header: *header,
            payload: payload.to_vec(),
        });
        Ok(Disposition::Buffered {
            reply: ack_header(s.sequence_number, expected, local_port, peer_port),
        })
    } else {
        Ok(Disposition::Stale {
            reply: ack_header(s.sequence_number, expected, local_port, peer_port),
        })
    }
}

/// Deliver every buffered segment that continues the stream.
///
/// Returns the accumulated ACK header when at least one entry drained.
fn drain_ready<W: Write>(
    s: &mut ReceiverShared<W>,
    local_port: u16,
    peer_port: u16,
) -> std::io::Result<Option<SegmentHeader>> {
    let mut drained = false;
    while let Some(entry) = s.buffer.pop_front_if(s.ack_number) {
        s.sink.write_all(&entry.payload)?;
        s.sink.flush()?;
        s.ack_number = next_seq(entry.seq, entry.payload_len());
        drained = true;
    }

    if drained {
        Ok(Some(ack_header(
            s.sequence_number,
            s.ack_number,
            local_port,
            peer_port,
        )))
    } else {
        Ok(None)
    }
}

async fn recv_loop<W: Write + Send>(ctx: ReceiverCtx<W>) -> Result<(), MtpError> {
    let max_datagram = HEADER_SIZE + usize::from(ctx.link.mss);
    loop {
        let (datagram, _from) = ctx.socket.recv_datagram(max_datagram).await?;
        let (header, payload) = match segment::split(&datagram) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(%err, "discarding malformed datagram");
                continue;
            }
        };
        if header.src_port != ctx.link.peer_port {
            debug!(src_port = header.src_port, "ignoring segment from unknown peer");
            continue;
        }
        ctx.reporter
            .emit(SegmentEvent::DataReceived, &header, Some(payload));

        let disposition = {
            let mut s = ctx.shared.lock().await;
            handle_segment(&mut s, &header, payload, ctx.local_port, ctx.link.peer_port)
                .map_err(MtpError::Io)?
        };

        let reply = match disposition {
            Disposition::InOrder { reply } => reply,
            Disposition::Buffered { reply } | Disposition::Stale { reply } => Some(reply),
        };
        if let Some(reply) = reply {
            ctx.reporter.emit(SegmentEvent::AckSent, &reply, None);
            ctx.socket.send_datagram(&reply.encode(), ctx.link.peer).await?;
        }
    }
}

async fn drain_loop<W: Write + Send>(ctx: ReceiverCtx<W>) -> Result<(), MtpError> {
    loop {
        let reply = {
            let mut s = ctx.shared.lock().await;
            drain_ready(&mut s, ctx.local_port, ctx.link.peer_port).map_err(MtpError::Io)?
        };

        if let Some(reply) = reply {
            ctx.reporter
                .emit(SegmentEvent::AccumulatedAckSent, &reply, None);
            ctx.socket.send_datagram(&reply.encode(), ctx.link.peer).await?;
        }

        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: u16 = 7_000;
    const PEER: u16 = 50_001;

    fn shared(ack_number: u32) -> ReceiverShared<Vec<u8>> {
        ReceiverShared {
            sequence_number: 900,
            ack_number,
            buffer: ReorderBuffer::new(),
            sink: Vec::new(),
        }
    }

    fn data_header(seq: u32, payload_len: u32) -> SegmentHeader {
        SegmentHeader {
            syn: false,
            ack: false,
            dest_port: LOCAL,
            src_port: PEER,
            seq,
            ack_num: 0,
            mss: 0,
            mws: 0,
            payload_len,
        }
    }

    fn feed(
        s: &mut ReceiverShared<Vec<u8>>,
        seq: u32,
        payload: &[u8],
    ) -> Disposition {
        let header = data_header(seq, payload.len() as u32);
        handle_segment(s, &header, payload, LOCAL, PEER).unwrap()
    }

    #[test]
    fn test_in_order_delivery_acks_each_segment() {
        let mut s = shared(0);

        for (seq, payload) in [(0u32, b"aaa"), (3, b"bbb"), (6, b"ccc")] {
            let disposition = feed(&mut s, seq, payload);
            let Disposition::InOrder { reply: Some(reply) } = disposition else {
                panic!("expected an immediate ACK");
            };
            assert_eq!(reply.ack_num, seq + 3);
            assert_eq!(reply.seq, 900);
            assert_eq!(reply.src_port, LOCAL);
            assert_eq!(reply.dest_port, PEER);
            assert!(reply.ack);
            assert_eq!(reply.payload_len, 0);
        }

        assert_eq!(s.sink, b"aaabbbccc");
        assert_eq!(s.ack_number, 9);
        assert!(s.buffer.is_empty());
    }

    #[test]
    fn test_ahead_segment_buffers_and_duplicate_acks() {
        let mut s = shared(0);

        let disposition = feed(&mut s, 6, b"ccc");
        let Disposition::Buffered { reply } = disposition else {
            panic!("expected the segment to be buffered");
        };
        assert_eq!(reply.ack_num, 0, "duplicate ACK repeats the expected seq");
        assert!(s.sink.is_empty());
        assert_eq!(s.buffer.len(), 1);
    }

    #[test]
    fn test_gap_fill_withholds_ack_and_drain_accumulates() {
        let mut s = shared(0);

        // seg0 arrives in order, seg2 ahead, then seg1 closes the gap.
        assert!(matches!(
            feed(&mut s, 0, b"aaa"),
            Disposition::InOrder { reply: Some(_) }
        ));
        assert!(matches!(feed(&mut s, 6, b"ccc"), Disposition::Buffered { .. }));

        let disposition = feed(&mut s, 3, b"bbb");
        assert_eq!(disposition, Disposition::InOrder { reply: None });
        assert_eq!(s.sink, b"aaabbb");

        // The drain flow flushes the buffered run with a single ACK.
        let reply = drain_ready(&mut s, LOCAL, PEER).unwrap().unwrap();
        assert_eq!(reply.ack_num, 9);
        assert_eq!(s.sink, b"aaabbbccc");
        assert!(s.buffer.is_empty());

        // Nothing further to drain, no further ACK.
        assert!(drain_ready(&mut s, LOCAL, PEER).unwrap().is_none());
    }

    #[test]
    fn test_drain_flushes_consecutive_run() {
        let mut s = shared(0);
        assert!(matches!(feed(&mut s, 3, b"bbb"), Disposition::Buffered { .. }));
        assert!(matches!(feed(&mut s, 6, b"ccc"), Disposition::Buffered { .. }));
        assert!(matches!(feed(&mut s, 9, b"ddd"), Disposition::Buffered { .. }));

        // seg0 closes the gap in front of the whole run.
        assert_eq!(feed(&mut s, 0, b"aaa"), Disposition::InOrder { reply: None });

        let reply = drain_ready(&mut s, LOCAL, PEER).unwrap().unwrap();
        assert_eq!(reply.ack_num, 12);
        assert_eq!(s.sink, b"aaabbbcccddd");
    }

    #[test]
    fn test_stale_segment_not_redelivered() {
        let mut s = shared(0);
        feed(&mut s, 0, b"aaa");

        let disposition = feed(&mut s, 0, b"aaa");
        let Disposition::Stale { reply } = disposition else {
            panic!("expected the duplicate to be stale");
        };
        assert_eq!(reply.ack_num, 3);
        assert_eq!(s.sink, b"aaa", "duplicate payload must not be delivered twice");
    }

    #[test]
    fn test_retransmitted_buffered_segment_not_duplicated() {
        let mut s = shared(0);
        feed(&mut s, 6, b"ccc");
        feed(&mut s, 6, b"ccc");
        assert_eq!(s.buffer.len(), 1);
    }
}
