//! Sender-side connection establishment.
//!
//! Three-way exchange: SYN out (carrying the ISN and the negotiated
//! MSS/MWS), SYN+ACK back, plain ACK out. Handshake segments never pass
//! through the loss gate. Replies that are not a SYN+ACK, or that
//! acknowledge something below our ISN, are discarded and the wait
//! continues.

use tracing::{info, warn};

use crate::core::error::MtpError;
use crate::core::event::{EventReporter, SegmentEvent};
use crate::core::seq::{initial_seq, next_seq};
use crate::transport::socket::MtpSocket;
use crate::wire::header::{HEADER_SIZE, SegmentHeader};

use super::SenderConfig;

/// Sender connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    /// No connection attempt yet.
    Closed,
    /// SYN sent, waiting for the SYN+ACK reply.
    SynSent,
    /// Handshake complete, data transfer may begin.
    Established,
}

/// Negotiated connection state handed to the transfer engine.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EstablishedLink {
    /// Next sequence number this endpoint will send (`ISN + 1`).
    pub seq: u32,
    /// Next sequence number expected from the peer.
    pub ack_num: u32,
}

/// Run the sender side of the handshake to completion.
///
/// `local_port` is the actually-bound port (the configured one may be 0).
pub(crate) async fn establish(
    socket: &MtpSocket,
    config: &SenderConfig,
    local_port: u16,
    reporter: &EventReporter,
) -> Result<EstablishedLink, MtpError> {
    let mut phase = SenderPhase::Closed;
    info!(state = ?phase, "entering handshake");

    let isn = initial_seq(config.seed);
    let syn = SegmentHeader {
        syn: true,
        ack: false,
        dest_port: config.receiver_addr.port(),
        src_port: local_port,
        seq: isn,
        ack_num: 0,
        mss: config.max_segment_size,
        mws: config.max_window_size,
        payload_len: 0,
    };
    reporter.emit(SegmentEvent::SynSent, &syn, None);
    socket.send_datagram(&syn.encode(), config.receiver_addr).await?;
    reporter.emit(SegmentEvent::WireSent, &syn, None);

    phase = SenderPhase::SynSent;
    info!(state = ?phase, isn, "SYN sent");

    let reply = loop {
        let (datagram, _from) = socket.recv_datagram(HEADER_SIZE).await?;
        let header = match SegmentHeader::decode(&datagram) {
            Ok(header) => header,
            Err(err) => {
                warn!(%err, "discarding malformed datagram during handshake");
                continue;
            }
        };
        if !(header.syn && header.ack) {
            continue;
        }
        if header.ack_num < isn {
            continue;
        }
        break header;
    };
    reporter.emit(SegmentEvent::SynAckReceived, &reply, None);

    let ack_num = next_seq(reply.seq, 1);
    let seq = next_seq(isn, 1);
    let handshake_ack = SegmentHeader {
        syn: false,
        ack: true,
        dest_port: config.receiver_addr.port(),
        src_port: local_port,
        seq,
        ack_num,
        mss: config.max_segment_size,
        mws: config.max_window_size,
        payload_len: 0,
    };
    reporter.emit(SegmentEvent::HandshakeAckSent, &handshake_ack, None);
    socket
        .send_datagram(&handshake_ack.encode(), config.receiver_addr)
        .await?;
    reporter.emit(SegmentEvent::WireSent, &handshake_ack, None);

    phase = SenderPhase::Established;
    info!(state = ?phase, seq, ack_num, "handshake complete");

    Ok(EstablishedLink { seq, ack_num })
}
