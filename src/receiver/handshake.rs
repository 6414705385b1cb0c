//! Receiver-side connection establishment.
//!
//! The receiver waits in `SynWait` until a SYN arrives, recording the
//! sender's port and the negotiated MSS/MWS from it, then answers with
//! SYN+ACK and is established. Non-SYN traffic during the wait is discarded
//! by a plain loop. The final handshake ACK is consumed with a single
//! receive: if something else arrives instead (a reordered or duplicate
//! datagram), it is discarded and data transfer starts anyway - the
//! sender's retransmission machinery recovers whatever was lost.

use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::core::error::MtpError;
use crate::core::event::{EventReporter, SegmentEvent};
use crate::core::seq::{initial_seq, next_seq};
use crate::transport::socket::MtpSocket;
use crate::wire::header::{HEADER_SIZE, SegmentHeader};

/// Receiver connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverPhase {
    /// Listening for a SYN segment.
    SynWait,
    /// SYN+ACK sent, connection usable.
    Established,
}

/// Negotiated connection state handed to the delivery engine.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AcceptedLink {
    /// Address ACKs are sent back to.
    pub peer: SocketAddr,
    /// Source port every accepted segment must carry.
    pub peer_port: u16,
    /// The receiver's own sequence number.
    pub seq: u32,
    /// Next sequence number expected from the sender.
    pub ack_num: u32,
    /// Negotiated maximum segment size.
    pub mss: u16,
    /// Negotiated maximum window size, in segments.
    pub mws: u16,
}

/// Wait for a sender and run the receiver side of the handshake.
pub(crate) async fn accept(
    socket: &MtpSocket,
    local_port: u16,
    seed: u64,
    reporter: &EventReporter,
) -> Result<AcceptedLink, MtpError> {
    let mut phase = ReceiverPhase::SynWait;
    info!(state = ?phase, "waiting for connection");

    let (syn, from) = loop {
        let (datagram, from) = socket.recv_datagram(HEADER_SIZE).await?;
        match SegmentHeader::decode(&datagram) {
            Ok(header) if header.syn => break (header, from),
            Ok(_) => continue,
            Err(err) => {
                warn!(%err, "discarding malformed datagram while waiting for SYN");
                continue;
            }
        }
    };
    reporter.emit(SegmentEvent::SynReceived, &syn, None);

    let peer_port = syn.src_port;
    let peer = SocketAddr::new(from.ip(), peer_port);
    let ack_num = next_seq(syn.seq, 1);
    let isn = initial_seq(seed);

    let syn_ack = SegmentHeader {
        syn: true,
        ack: true,
        dest_port: peer_port,
        src_port: local_port,
        seq: isn,
        ack_num,
        mss: syn.mss,
        mws: syn.mws,
        payload_len: 0,
    };
    reporter.emit(SegmentEvent::SynAckSent, &syn_ack, None);
    socket.send_datagram(&syn_ack.encode(), peer).await?;

    phase = ReceiverPhase::Established;
    info!(state = ?phase, %peer, mss = syn.mss, mws = syn.mws, "connection established");

    // One receive for the third handshake segment. Anything else that lands
    // here instead is lost to the sender's retransmission machinery.
    let mut seq = isn;
    let (datagram, _) = socket
        .recv_datagram(HEADER_SIZE + usize::from(syn.mss))
        .await?;
    match SegmentHeader::decode(&datagram) {
        Ok(header) if !header.syn && header.ack && header.src_port == peer_port => {
            reporter.emit(SegmentEvent::HandshakeAckReceived, &header, None);
            seq = next_seq(seq, 1);
        }
        Ok(header) => {
            debug!(seq = header.seq, "expected final handshake ACK, discarding segment");
        }
        Err(err) => {
            warn!(%err, "discarding malformed datagram instead of final handshake ACK");
        }
    }

    Ok(AcceptedLink {
        peer,
        peer_port,
        seq,
        ack_num,
        mss: syn.mss,
        mws: syn.mws,
    })
}
