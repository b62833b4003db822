//! Reliable-enough datagram transport abstraction.
//!
//! The session transport is the only surface that crosses threads (§5 of the
//! design): controllers are single-threaded and cooperative, calling
//! `receive_all` once at the top of every `update`. [`UdpTransport`] buffers
//! inbound datagrams on a background reader thread behind a
//! `parking_lot::Mutex`-guarded queue; the optional `tokio`-feature transport
//! instead polls a non-blocking async socket directly, with no background
//! thread of its own.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::Address;

const RECV_BUFFER_SIZE: usize = 4096;

/// A non-blocking, unordered, unreliable datagram transport.
///
/// Messages are sent UDP-style: no ordering or delivery guarantee. The
/// control layer (`wire`) builds its own reliability where it needs it
/// (e.g. the join handshake is retried by the client controller on timeout).
pub trait NonBlockingTransport<A: Address> {
    /// Sends `bytes` to `addr`. Best-effort; failures are logged, not
    /// propagated, matching the "unreliable" framing of the transport.
    fn send_to(&mut self, bytes: &[u8], addr: &A);

    /// Returns every datagram received since the last call, each paired
    /// with its sender's address. Never blocks.
    fn receive_all(&mut self) -> Vec<(A, Vec<u8>)>;
}

/// A UDP transport with a dedicated blocking reader thread.
///
/// The reader thread is the one permitted background actor in the
/// concurrency model; it only ever pushes onto `inbound`, never touches
/// simulation state.
pub struct UdpTransport {
    socket: UdpSocket,
    inbound: Arc<Mutex<VecDeque<(SocketAddr, Vec<u8>)>>>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Binds to `0.0.0.0:port` and spawns the background reader thread.
    pub fn bind_to_port(port: u16) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let socket = UdpSocket::bind(addr)?;
        let inbound = Arc::new(Mutex::new(VecDeque::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let reader_socket = socket.try_clone()?;
        let reader_inbound = Arc::clone(&inbound);
        let reader_shutdown = Arc::clone(&shutdown);
        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            while !reader_shutdown.load(Ordering::Relaxed) {
                match reader_socket.recv_from(&mut buf) {
                    Ok((len, from)) => {
                        reader_inbound.lock().push_back((from, buf[..len].to_vec()));
                    },
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        continue;
                    },
                    Err(e) => {
                        tracing::warn!("udp transport reader thread stopped: {e}");
                        break;
                    },
                }
            }
        });

        Ok(Self {
            socket,
            inbound,
            shutdown,
            reader: Some(reader),
        })
    }
}

impl NonBlockingTransport<SocketAddr> for UdpTransport {
    fn send_to(&mut self, bytes: &[u8], addr: &SocketAddr) {
        if let Err(e) = self.socket.send_to(bytes, addr) {
            tracing::warn!("udp send_to {addr} failed: {e}");
        }
    }

    fn receive_all(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.inbound.lock().drain(..).collect()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The reader thread is parked in a blocking recv_from and has no
        // self-pipe to wake it; detach rather than block the drop on join.
        self.reader.take();
    }
}

/// A UDP transport built on Tokio's non-blocking socket API.
///
/// Unlike [`UdpTransport`], this has no background thread: `receive_all`
/// drains the OS socket buffer directly via `try_recv_from` until it would
/// block. Requires an active Tokio runtime (the socket is constructed from
/// a bound `std::net::UdpSocket` via [`tokio::net::UdpSocket::from_std`]).
#[cfg(feature = "tokio")]
pub struct TokioUdpTransport {
    socket: tokio::net::UdpSocket,
}

#[cfg(feature = "tokio")]
impl TokioUdpTransport {
    /// Binds to `0.0.0.0:port` and wraps the socket for non-blocking
    /// polling from within a Tokio runtime.
    pub fn bind_to_port(port: u16) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let std_socket = UdpSocket::bind(addr)?;
        std_socket.set_nonblocking(true)?;
        Ok(Self {
            socket: tokio::net::UdpSocket::from_std(std_socket)?,
        })
    }
}

#[cfg(feature = "tokio")]
impl NonBlockingTransport<SocketAddr> for TokioUdpTransport {
    fn send_to(&mut self, bytes: &[u8], addr: &SocketAddr) {
        match self.socket.try_send_to(bytes, *addr) {
            Ok(_) | Err(_) if false => unreachable!(),
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::WouldBlock => {},
            Err(e) => tracing::warn!("tokio udp send_to {addr} failed: {e}"),
        }
    }

    fn receive_all(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        let mut out = Vec::new();
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, from)) => out.push((from, buf[..len].to_vec())),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!("tokio udp recv_from failed: {e}");
                    break;
                },
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_transport_binds_and_sends_to_itself() {
        let mut a = UdpTransport::bind_to_port(0).unwrap();
        let a_addr = a.socket.local_addr().unwrap();
        let mut b = UdpTransport::bind_to_port(0).unwrap();
        let b_addr = b.socket.local_addr().unwrap();

        b.send_to(b"hello", &a_addr);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut received = Vec::new();
        while received.is_empty() && std::time::Instant::now() < deadline {
            received = a.receive_all();
            if received.is_empty() {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, b_addr);
        assert_eq!(received[0].1, b"hello");
    }
}
