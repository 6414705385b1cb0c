//! Async UDP socket wrapper for MTP endpoints.
//!
//! Thin adapter over [`tokio::net::UdpSocket`]: send one datagram, receive
//! one datagram. All framing lives in [`crate::wire`]; all reliability lives
//! in the engines. The handle is cheaply cloneable so the concurrent flows
//! of one endpoint can share a single bound socket.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

/// Cloneable handle to one bound UDP socket.
#[derive(Debug, Clone)]
pub struct MtpSocket {
    socket: Arc<UdpSocket>,
}

impl MtpSocket {
    /// Bind a socket to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one datagram to `dest`.
    pub async fn send_datagram(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.socket.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive one datagram of at most `max_size` bytes.
    ///
    /// Blocks until a datagram arrives. Anything beyond `max_size` is
    /// truncated by the OS, mirroring a fixed-size receive buffer.
    pub async fn recv_datagram(&self, max_size: usize) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; max_size];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }
}
