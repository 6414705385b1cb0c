//! Structured protocol event observation.
//!
//! Every significant action of an endpoint (segment sent, dropped, received,
//! ACK sent, timeout fired, fast retransmit fired, handshake steps) is
//! reported to an [`EventObserver`] as an [`EventRecord`]. Observers are
//! diagnostics only and never feed back into control flow.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::wire::SegmentHeader;

/// Longest payload preview rendered into an event record.
const PREVIEW_CHARS: usize = 48;

/// The kind of action an [`EventRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    /// Sender transmitted its SYN segment.
    SynSent,
    /// Receiver saw a SYN segment while waiting for a connection.
    SynReceived,
    /// Receiver replied with SYN+ACK.
    SynAckSent,
    /// Sender saw the SYN+ACK reply.
    SynAckReceived,
    /// Sender transmitted the final handshake ACK.
    HandshakeAckSent,
    /// Receiver saw the final handshake ACK.
    HandshakeAckReceived,
    /// A data segment was submitted for transmission. The loss gate may
    /// still drop it, in which case a [`SegmentEvent::Dropped`] follows;
    /// otherwise a [`SegmentEvent::WireSent`] confirms the handoff.
    DataSent,
    /// The loss gate dropped an outbound segment before the wire.
    Dropped,
    /// The segment cleared the loss gate and was handed to the socket.
    WireSent,
    /// A data segment arrived from the peer.
    DataReceived,
    /// An ACK segment was placed on the wire.
    AckSent,
    /// A single accumulated ACK covering drained buffer entries was sent.
    AccumulatedAckSent,
    /// A new cumulative ACK arrived.
    AckReceived,
    /// A duplicate ACK arrived.
    DuplicateAckReceived,
    /// The retransmission timer fired and the oldest unacked segment was resent.
    TimeoutRetransmit,
    /// Triple duplicate ACK triggered an immediate resend.
    FastRetransmit,
    /// The final cumulative ACK arrived; the connection is closing.
    TransferComplete,
}

impl SegmentEvent {
    /// Human-readable description used by the text log observer.
    pub fn describe(self) -> &'static str {
        match self {
            Self::SynSent => "Sent SYN segment",
            Self::SynReceived => "Received SYN segment",
            Self::SynAckSent => "Sent SYN ACK segment",
            Self::SynAckReceived => "Received SYN ACK segment",
            Self::HandshakeAckSent => "Sent final handshake ACK segment",
            Self::HandshakeAckReceived => "Received final handshake ACK segment",
            Self::DataSent => "Attempting to send data segment",
            Self::Dropped => "Outbound segment dropped by loss gate",
            Self::WireSent => "Segment placed on the wire",
            Self::DataReceived => "Received data segment",
            Self::AckSent => "Sent ACK",
            Self::AccumulatedAckSent => "Sent accumulated ACK from reorder buffer",
            Self::AckReceived => "Received ACK segment",
            Self::DuplicateAckReceived => "Received duplicate ACK segment",
            Self::TimeoutRetransmit => "Timeout, attempting to resend oldest unacked segment",
            Self::FastRetransmit => "Fast retransmit attempt",
            Self::TransferComplete => "All segments acknowledged, closing",
        }
    }
}

/// One observed protocol action.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Milliseconds elapsed since the endpoint started.
    pub timestamp_ms: u64,
    /// What happened.
    pub event: SegmentEvent,
    /// Header of the segment involved.
    pub header: SegmentHeader,
    /// Truncated, lossily-decoded view of the payload, if any.
    pub payload_preview: Option<String>,
}

/// Callback invoked with every significant endpoint action.
pub trait EventObserver: Send + Sync {
    /// Handle one event record.
    fn on_event(&self, record: &EventRecord);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl EventObserver for NullObserver {
    fn on_event(&self, _record: &EventRecord) {}
}

/// Observer that renders events as a human-readable text log.
///
/// The format mirrors the endpoint log files: a `TIME`/`EVENT`/`HEADER`/
/// `PAYLOAD` block per event. Write failures are swallowed; logging must
/// never take down the transfer.
pub struct LogWriterObserver<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LogWriterObserver<W> {
    /// Create an observer writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send> EventObserver for LogWriterObserver<W> {
    fn on_event(&self, record: &EventRecord) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };

        // The fate of a send attempt is a bare marker line trailing the
        // attempt's own block, not a block of its own.
        match record.event {
            SegmentEvent::Dropped => {
                let _ = writeln!(out, "---- Was Dropped!");
                let _ = writeln!(out);
                let _ = out.flush();
                return;
            }
            SegmentEvent::WireSent => {
                let _ = writeln!(out, "++++ Was Successfully Sent!");
                let _ = writeln!(out);
                let _ = out.flush();
                return;
            }
            _ => {}
        }

        let h = &record.header;
        let _ = writeln!(out, "TIME: {}ms", record.timestamp_ms);
        let _ = writeln!(out, "EVENT: {} of Seq: {}", record.event.describe(), h.seq);
        let _ = writeln!(
            out,
            "HEADER: SYN={}, ACK={}, SrcPort={}, DestPort={}, SeqNum={}, AckNum={}, MSS={}, MWS={}, Len={}",
            h.syn, h.ack, h.src_port, h.dest_port, h.seq, h.ack_num, h.mss, h.mws, h.payload_len
        );
        match record.payload_preview.as_deref() {
            Some(preview) if !preview.is_empty() => {
                let _ = writeln!(out, "PAYLOAD: {preview}");
            }
            _ => {
                let _ = writeln!(out, "PAYLOAD: NO DATA");
            }
        }
        let _ = writeln!(out);
        let _ = out.flush();
    }
}

/// Shared handle the engines use to stamp and publish event records.
#[derive(Clone)]
pub struct EventReporter {
    observer: Arc<dyn EventObserver>,
    start: Instant,
}

impl EventReporter {
    /// Create a reporter whose timestamps count from now.
    pub fn new(observer: Arc<dyn EventObserver>) -> Self {
        Self {
            observer,
            start: Instant::now(),
        }
    }

    /// Publish one event.
    pub fn emit(&self, event: SegmentEvent, header: &SegmentHeader, payload: Option<&[u8]>) {
        let record = EventRecord {
            timestamp_ms: self.start.elapsed().as_millis() as u64,
            event,
            header: *header,
            payload_preview: payload.map(preview),
        };
        self.observer.on_event(&record);
    }
}

fn preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
