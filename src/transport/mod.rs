//! Datagram transport: the UDP socket adapter and the loss-injection gate.

pub mod loss;
pub mod socket;

pub use loss::LossGate;
pub use socket::MtpSocket;
