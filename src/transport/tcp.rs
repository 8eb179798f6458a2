//! Stream-socket transport: frames are raw fixed-length payloads with no
//! length prefix, so framing only survives if every frame hits the wire
//! whole. The receive side reassembles across partial reads; the send side
//! treats a mid-frame stall as loss of the stream.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{SockRef, TcpKeepalive};

use super::{FrameSink, FrameSource, RecvOutcome, SendOutcome, Session};
use crate::audio::{FramePool, PcmFrame};
use crate::config::Config;
use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEPALIVE_IDLE: Duration = Duration::from_secs(5);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);

/// Floor for per-iteration socket timeouts; zero would mean "block forever".
const MIN_IO_WAIT: Duration = Duration::from_millis(1);

pub(super) fn parse_peer(peer: &str) -> io::Result<SocketAddr> {
    peer.parse().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bad peer address '{}': {}", peer, e),
        )
    })
}

/// Connect to the peer, or accept exactly one inbound peer when
/// `tcp_listen` is set.
pub fn open(config: &Config, peer: &str, pool: Arc<FramePool>) -> Result<Session, TransportError> {
    let stream = if config.tcp_listen {
        let listener = TcpListener::bind(("0.0.0.0", config.local_port))?;
        log::info!("listening on port {}", config.local_port);
        let (stream, remote) = listener.accept()?;
        log::info!("accepted connection from {}", remote);
        stream
    } else {
        let addr = parse_peer(peer)?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        log::info!("connected to {}", addr);
        stream
    };

    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL);
    SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;
    stream.set_write_timeout(Some(config.send_timeout().max(MIN_IO_WAIT)))?;

    let send_half = stream.try_clone()?;
    Ok(Session::new(
        Box::new(TcpFrameSink {
            stream: send_half,
            pool: pool.clone(),
        }),
        Box::new(TcpFrameSource {
            stream,
            frame_bytes: pool.frame_bytes(),
            pool,
            pending: None,
        }),
    ))
}

pub struct TcpFrameSink {
    stream: TcpStream,
    pool: Arc<FramePool>,
}

impl FrameSink for TcpFrameSink {
    fn send_frame(&mut self, frame: PcmFrame) -> Result<SendOutcome, TransportError> {
        let mut written = 0;
        let outcome = loop {
            match self.stream.write(&frame.bytes()[written..]) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => {
                    written += n;
                    if written == frame.len() {
                        break Ok(SendOutcome::Sent);
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    if written == 0 {
                        // Nothing on the wire yet; dropping the frame is safe.
                        break Ok(SendOutcome::WouldBlock);
                    }
                    // Partial frame on the wire: stream framing is lost.
                    log::error!("send stalled mid-frame ({}/{} bytes)", written, frame.len());
                    break Err(TransportError::Closed);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e.into()),
            }
        };
        self.pool.release(frame);
        outcome
    }
}

pub struct TcpFrameSource {
    stream: TcpStream,
    pool: Arc<FramePool>,
    frame_bytes: usize,
    /// Partially reassembled frame carried across timed-out calls.
    pending: Option<(PcmFrame, usize)>,
}

impl FrameSource for TcpFrameSource {
    fn recv_frame(&mut self, timeout: Duration) -> Result<RecvOutcome, TransportError> {
        let deadline = Instant::now() + timeout;

        let (mut frame, mut filled) = match self.pending.take() {
            Some(partial) => partial,
            None => match self.pool.acquire() {
                Some(frame) => (frame, 0),
                None => {
                    log::debug!("tcp recv: frame pool exhausted, skipping cycle");
                    std::thread::sleep(timeout);
                    return Ok(RecvOutcome::TimedOut);
                }
            },
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.pending = Some((frame, filled));
                return Ok(RecvOutcome::TimedOut);
            }
            self.stream.set_read_timeout(Some(remaining.max(MIN_IO_WAIT)))?;

            match self.stream.read(&mut frame.buf_mut()[filled..]) {
                Ok(0) => {
                    if filled > 0 {
                        // Undersized final frame before disconnect: discarded,
                        // never played.
                        log::debug!("discarding undersized final frame ({} bytes)", filled);
                    }
                    self.pool.release(frame);
                    return Err(TransportError::Closed);
                }
                Ok(n) => {
                    filled += n;
                    if filled == self.frame_bytes {
                        frame.set_len(filled);
                        return Ok(RecvOutcome::Frame(frame));
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    self.pending = Some((frame, filled));
                    return Ok(RecvOutcome::TimedOut);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.pool.release(frame);
                    return Err(e.into());
                }
            }
        }
    }
}
