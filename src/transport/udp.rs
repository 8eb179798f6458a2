//! Datagram transport: one packet per frame, no retransmission. Stale audio
//! is worse than missing audio, so loss is accepted silently.

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::tcp::parse_peer;
use super::{FrameSink, FrameSource, RecvOutcome, SendOutcome, Session};
use crate::audio::{FramePool, PcmFrame};
use crate::config::Config;
use crate::error::TransportError;

const MIN_IO_WAIT: Duration = Duration::from_millis(1);

/// Bind the local port and associate the socket with the peer so stray
/// senders are filtered by the kernel.
pub fn open(config: &Config, peer: &str, pool: Arc<FramePool>) -> Result<Session, TransportError> {
    let socket = UdpSocket::bind(("0.0.0.0", config.local_port))?;
    let addr = parse_peer(peer)?;
    socket.connect(addr)?;
    socket.set_write_timeout(Some(config.send_timeout().max(MIN_IO_WAIT)))?;
    log::info!("udp socket on port {} associated with {}", config.local_port, addr);

    let send_half = socket.try_clone()?;
    Ok(Session::new(
        Box::new(UdpFrameSink {
            socket: send_half,
            pool: pool.clone(),
        }),
        Box::new(UdpFrameSource {
            socket,
            frame_bytes: pool.frame_bytes(),
            pool,
        }),
    ))
}

pub struct UdpFrameSink {
    socket: UdpSocket,
    pool: Arc<FramePool>,
}

impl FrameSink for UdpFrameSink {
    fn send_frame(&mut self, frame: PcmFrame) -> Result<SendOutcome, TransportError> {
        let result = self.socket.send(frame.bytes());
        self.pool.release(frame);
        match result {
            Ok(_) => Ok(SendOutcome::Sent),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(SendOutcome::WouldBlock)
            }
            // ICMP unreachable from an earlier packet; the peer may simply
            // not be up yet. Counts as loss, not as a dead transport.
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                log::debug!("udp send: peer not listening");
                Ok(SendOutcome::WouldBlock)
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct UdpFrameSource {
    socket: UdpSocket,
    pool: Arc<FramePool>,
    frame_bytes: usize,
}

impl FrameSource for UdpFrameSource {
    fn recv_frame(&mut self, timeout: Duration) -> Result<RecvOutcome, TransportError> {
        let deadline = Instant::now() + timeout;

        let mut frame = match self.pool.acquire() {
            Some(frame) => frame,
            None => {
                log::debug!("udp recv: frame pool exhausted, skipping cycle");
                std::thread::sleep(timeout);
                return Ok(RecvOutcome::TimedOut);
            }
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.pool.release(frame);
                return Ok(RecvOutcome::TimedOut);
            }
            self.socket.set_read_timeout(Some(remaining.max(MIN_IO_WAIT)))?;

            match self.socket.recv(frame.buf_mut()) {
                Ok(n) if n == self.frame_bytes => {
                    frame.set_len(n);
                    return Ok(RecvOutcome::Frame(frame));
                }
                Ok(n) => {
                    // Frame-size mismatch is undetectable in general; a
                    // wrong-sized datagram is the one observable symptom.
                    log::debug!("dropping datagram of {} bytes (expected {})", n, self.frame_bytes);
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    self.pool.release(frame);
                    return Ok(RecvOutcome::TimedOut);
                }
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.pool.release(frame);
                    return Err(e.into());
                }
            }
        }
    }
}
