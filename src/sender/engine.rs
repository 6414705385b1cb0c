//! Sliding-window transfer engine.
//!
//! After the handshake the sender runs two concurrent flows plus a timer:
//!
//! - the **send loop** pushes segments while they fit inside
//!   `send_base + MWS * MSS`, marking each `Sent`;
//! - the **receive loop** consumes ACKs, advancing the window on new
//!   cumulative ACKs and counting duplicates toward fast retransmit;
//! - the **retransmission timer** is a single-shot task that resends the
//!   oldest unacknowledged segment when no ACK progress is made in time.
//!
//! All three share one state record behind a mutex; every read-modify-write
//! (status flips, window movement, duplicate counting, timer arm/cancel)
//! happens inside one critical section. Datagram I/O stays outside the lock.
//! A timer firing that raced a cancellation notices its stale generation and
//! does nothing, so at most one timer is ever pending.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::core::error::MtpError;
use crate::core::event::{EventObserver, EventReporter, SegmentEvent};
use crate::transport::loss::LossGate;
use crate::transport::socket::MtpSocket;
use crate::wire::header::{HEADER_SIZE, SegmentHeader};
use crate::wire::segment;

use super::SenderConfig;
use super::handshake::{self, EstablishedLink};
use super::store::{SegmentStatus, SegmentStore};

/// A connected MTP sender endpoint.
///
/// Created by [`MtpSender::connect`], which binds the local socket and runs
/// the handshake; [`MtpSender::transfer`] then moves one byte stream and
/// resolves once the final cumulative ACK arrives.
pub struct MtpSender {
    config: SenderConfig,
    socket: MtpSocket,
    local_port: u16,
    reporter: EventReporter,
    link: EstablishedLink,
}

impl MtpSender {
    /// Bind the local socket and establish a connection to the receiver.
    pub async fn connect(
        config: SenderConfig,
        observer: Arc<dyn EventObserver>,
    ) -> Result<Self, MtpError> {
        config.validate()?;

        let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.local_port);
        let socket = MtpSocket::bind(local).await?;
        let local_port = socket.local_addr()?.port();

        let reporter = EventReporter::new(observer);
        let link = handshake::establish(&socket, &config, local_port, &reporter).await?;

        Ok(Self {
            config,
            socket,
            local_port,
            reporter,
            link,
        })
    }

    /// The sender's bound local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Transfer `source` to the connected receiver.
    ///
    /// Resolves once a cumulative ACK at or past the last segment's sequence
    /// number arrives. Transport failures are fatal and surface as `Err`.
    pub async fn transfer(self, source: &[u8]) -> Result<(), MtpError> {
        let store = SegmentStore::segment_source(
            source,
            self.link.seq,
            usize::from(self.config.max_segment_size),
        );
        let first_seq = store.seq_at(0).unwrap_or(self.link.seq);
        let last_seq = store.last_seq();
        info!(
            segments = store.len(),
            first_seq, last_seq, "starting data transfer"
        );

        let shared = SenderShared {
            store,
            send_base: first_seq,
            sequence_number: first_seq,
            ack_number: self.link.ack_num,
            next_index: 0,
            window: self.config.window_bytes(),
            last_seq,
            dup: DupAckTracker::default(),
            timer: TimerState::default(),
            loss: LossGate::new(self.config.drop_probability, self.config.seed),
            closed: false,
        };

        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        let ctx = SenderCtx {
            shared: Arc::new(Mutex::new(shared)),
            socket: self.socket.clone(),
            peer: self.config.receiver_addr,
            local_port: self.local_port,
            peer_port: self.config.receiver_addr.port(),
            reporter: self.reporter.clone(),
            timeout: self.config.timeout,
            fatal: fatal_tx,
        };

        tokio::select! {
            biased;
            result = async {
                tokio::try_join!(send_loop(ctx.clone()), recv_loop(ctx.clone()))
            } => result.map(|_| ()),
            // A timer task hit a transport failure it could not return.
            Some(err) = fatal_rx.recv() => Err(err),
        }
    }
}

/// Connection state shared by the send loop, receive loop, and timer.
struct SenderShared {
    store: SegmentStore,
    /// Smallest sequence number not yet cumulatively acknowledged.
    send_base: u32,
    /// Sequence number of the next segment to transmit.
    sequence_number: u32,
    /// Echoed in every outbound data header; fixed after the handshake.
    ack_number: u32,
    /// Index of the next untransmitted segment.
    next_index: usize,
    /// Outstanding-byte budget (`MWS * MSS`).
    window: u64,
    /// Sequence number of the final segment; reaching it ends the transfer.
    last_seq: u32,
    dup: DupAckTracker,
    timer: TimerState,
    loss: LossGate,
    closed: bool,
}

/// Cloneable handle giving each flow access to the shared state and socket.
#[derive(Clone)]
struct SenderCtx {
    shared: Arc<Mutex<SenderShared>>,
    socket: MtpSocket,
    peer: SocketAddr,
    local_port: u16,
    peer_port: u16,
    reporter: EventReporter,
    timeout: Duration,
    fatal: mpsc::Sender<MtpError>,
}

/// Single-shot retransmission timer bookkeeping.
///
/// Arming bumps the generation; a sleeping task that wakes with a stale
/// generation was cancelled or superseded and must do nothing.
#[derive(Debug, Default)]
struct TimerState {
    armed: bool,
    generation: u64,
}

/// Tracks consecutive duplicate ACKs toward fast retransmit.
#[derive(Debug, Default)]
struct DupAckTracker {
    primed: bool,
    last_ack: u32,
    count: u32,
}

impl DupAckTracker {
    /// Record one duplicate ACK; returns `true` when the third consecutive
    /// repeat of the same value should trigger a fast retransmit.
    fn observe(&mut self, ack: u32) -> bool {
        if !self.primed {
            self.primed = true;
            self.last_ack = ack;
            self.count = 1;
            return false;
        }
        if ack == self.last_ack {
            self.count += 1;
            if self.count >= 3 {
                self.primed = false;
                self.count = 0;
                return true;
            }
            false
        } else {
            // A different value starts a fresh run.
            self.last_ack = ack;
            self.count = 0;
            false
        }
    }
}

/// One prepared outbound segment, with the loss gate already consulted.
struct Transmission {
    header: SegmentHeader,
    payload: Vec<u8>,
    dropped: bool,
}

/// What the send loop should do next.
enum SendStep {
    /// Stream exhausted or connection closed.
    Finished,
    /// Next segment does not fit in the window yet.
    WindowFull,
    /// Transmit this segment.
    Transmit(Transmission),
}

/// Classification of one received ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckOutcome {
    /// New cumulative ACK; `rearm` is set when unacked segments remain.
    Advanced { rearm: bool },
    /// Cumulative ACK at or past the last segment's sequence number.
    Complete,
    /// Duplicate ACK without retransmission.
    Duplicate,
    /// Third consecutive duplicate: resend the segment with this sequence.
    FastRetransmit(u32),
}

fn data_header(
    local_port: u16,
    peer_port: u16,
    seq: u32,
    ack_num: u32,
    payload_len: u32,
) -> SegmentHeader {
    SegmentHeader {
        syn: false,
        ack: false,
        dest_port: peer_port,
        src_port: local_port,
        seq,
        ack_num,
        mss: 0,
        mws: 0,
        payload_len,
    }
}

/// Advance the send loop by one decision.
///
/// Returns the step plus whether the retransmission timer must be armed
/// (the transmitted segment is the first unacknowledged one).
fn next_send_step(s: &mut SenderShared, local_port: u16, peer_port: u16) -> (SendStep, bool) {
    if s.closed || s.next_index >= s.store.len() {
        return (SendStep::Finished, false);
    }
    if u64::from(s.sequence_number) >= u64::from(s.send_base) + s.window {
        return (SendStep::WindowFull, false);
    }

    let index = s.next_index;
    let Some((seq, payload)) = s
        .store
        .get(index)
        .map(|segment| (segment.seq, segment.payload.clone()))
    else {
        return (SendStep::Finished, false);
    };

    let header = data_header(local_port, peer_port, seq, s.ack_number, payload.len() as u32);
    let dropped = s.loss.should_drop();
    s.store.set_status(index, SegmentStatus::Sent);

    let arm = s.send_base == s.sequence_number;
    s.next_index += 1;
    if let Some(next) = s.store.seq_at(s.next_index) {
        s.sequence_number = next;
    }

    (
        SendStep::Transmit(Transmission {
            header,
            payload,
            dropped,
        }),
        arm,
    )
}

/// Apply one received ACK to the shared state.
fn process_ack(s: &mut SenderShared, ack: u32) -> AckOutcome {
    if ack > s.send_base {
        s.store.mark_acked_below(ack);
        s.send_base = ack;
        if ack >= s.last_seq {
            s.closed = true;
            AckOutcome::Complete
        } else {
            AckOutcome::Advanced {
                rearm: s.store.has_sent(),
            }
        }
    } else if s.dup.observe(ack) {
        AckOutcome::FastRetransmit(ack)
    } else {
        AckOutcome::Duplicate
    }
}

/// Prepare the retransmission of the oldest unacknowledged segment.
fn timeout_retransmission(
    s: &mut SenderShared,
    local_port: u16,
    peer_port: u16,
) -> Option<Transmission> {
    let (seq, payload) = s
        .store
        .first_sent()
        .map(|segment| (segment.seq, segment.payload.clone()))?;
    let header = data_header(local_port, peer_port, seq, s.ack_number, payload.len() as u32);
    let dropped = s.loss.should_drop();
    Some(Transmission {
        header,
        payload,
        dropped,
    })
}

/// Prepare the fast retransmission of the segment at `seq`.
fn fast_retransmission(
    s: &mut SenderShared,
    local_port: u16,
    peer_port: u16,
    seq: u32,
) -> Option<Transmission> {
    let payload = s.store.find_by_seq(seq).map(|segment| segment.payload.clone())?;
    let header = data_header(local_port, peer_port, seq, s.ack_number, payload.len() as u32);
    let dropped = s.loss.should_drop();
    Some(Transmission {
        header,
        payload,
        dropped,
    })
}

fn arm_timer(s: &mut SenderShared, ctx: &SenderCtx) {
    s.timer.generation = s.timer.generation.wrapping_add(1);
    s.timer.armed = true;
    let generation = s.timer.generation;
    let ctx = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(ctx.timeout).await;
        if let Err(err) = fire_timer(&ctx, generation).await {
            error!(%err, "transport failure during timeout retransmission");
            let _ = ctx.fatal.try_send(err);
        }
    });
}

fn cancel_timer(s: &mut SenderShared) {
    s.timer.armed = false;
    s.timer.generation = s.timer.generation.wrapping_add(1);
}

async fn fire_timer(ctx: &SenderCtx, generation: u64) -> Result<(), MtpError> {
    let transmission = {
        let mut s = ctx.shared.lock().await;
        if !s.timer.armed || s.timer.generation != generation || s.closed {
            return Ok(());
        }
        match timeout_retransmission(&mut s, ctx.local_port, ctx.peer_port) {
            Some(transmission) => {
                arm_timer(&mut s, ctx);
                Some(transmission)
            }
            None => {
                s.timer.armed = false;
                None
            }
        }
    };

    if let Some(transmission) = transmission {
        transmit(ctx, transmission, SegmentEvent::TimeoutRetransmit).await?;
    }
    Ok(())
}

/// Report the attempt, then either drop the segment or put it on the wire.
async fn transmit(
    ctx: &SenderCtx,
    transmission: Transmission,
    event: SegmentEvent,
) -> Result<(), MtpError> {
    ctx.reporter
        .emit(event, &transmission.header, Some(&transmission.payload));
    if transmission.dropped {
        debug!(seq = transmission.header.seq, "loss gate dropped segment");
        ctx.reporter.emit(
            SegmentEvent::Dropped,
            &transmission.header,
            Some(&transmission.payload),
        );
        return Ok(());
    }
    let datagram = segment::assemble(&transmission.header, &transmission.payload);
    ctx.socket.send_datagram(&datagram, ctx.peer).await?;
    ctx.reporter
        .emit(SegmentEvent::WireSent, &transmission.header, None);
    Ok(())
}

async fn send_loop(ctx: SenderCtx) -> Result<(), MtpError> {
    loop {
        let step = {
            let mut s = ctx.shared.lock().await;
            let (step, arm) = next_send_step(&mut s, ctx.local_port, ctx.peer_port);
            if arm {
                arm_timer(&mut s, &ctx);
            }
            step
        };

        match step {
            SendStep::Finished => {
                debug!("send loop finished: every segment transmitted once");
                return Ok(());
            }
            SendStep::WindowFull => {
                // Window closed; spin until an ACK moves send_base.
                tokio::task::yield_now().await;
            }
            SendStep::Transmit(transmission) => {
                transmit(&ctx, transmission, SegmentEvent::DataSent).await?;
            }
        }
    }
}

async fn recv_loop(ctx: SenderCtx) -> Result<(), MtpError> {
    loop {
        let (datagram, _from) = ctx.socket.recv_datagram(HEADER_SIZE).await?;
        let header = match SegmentHeader::decode(&datagram) {
            Ok(header) => header,
            Err(err) => {
                warn!(%err, "discarding malformed datagram");
                continue;
            }
        };
        if !header.ack {
            continue;
        }

        let (outcome, retransmission) = {
            let mut s = ctx.shared.lock().await;
            let outcome = process_ack(&mut s, header.ack_num);
            let retransmission = match outcome {
                AckOutcome::Advanced { rearm } => {
                    cancel_timer(&mut s);
                    if rearm {
                        arm_timer(&mut s, &ctx);
                    }
                    None
                }
                AckOutcome::Complete => {
                    cancel_timer(&mut s);
                    None
                }
                AckOutcome::Duplicate => None,
                AckOutcome::FastRetransmit(seq) => {
                    fast_retransmission(&mut s, ctx.local_port, ctx.peer_port, seq)
                }
            };
            (outcome, retransmission)
        };

        match outcome {
            AckOutcome::Advanced { .. } => {
                ctx.reporter.emit(SegmentEvent::AckReceived, &header, None);
            }
            AckOutcome::Complete => {
                ctx.reporter.emit(SegmentEvent::AckReceived, &header, None);
                ctx.reporter
                    .emit(SegmentEvent::TransferComplete, &header, None);
                info!(ack = header.ack_num, "transfer complete, closing connection");
                return Ok(());
            }
            AckOutcome::Duplicate => {
                ctx.reporter
                    .emit(SegmentEvent::DuplicateAckReceived, &header, None);
            }
            AckOutcome::FastRetransmit(_) => {
                ctx.reporter
                    .emit(SegmentEvent::DuplicateAckReceived, &header, None);
                if let Some(transmission) = retransmission {
                    transmit(&ctx, transmission, SegmentEvent::FastRetransmit).await?;
                }
            }
        }
    }
}
