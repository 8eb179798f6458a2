//! Transport abstraction: one contract over three wire variants.
//!
//! The wire format is identical everywhere: raw PCM bytes, fixed length per
//! message, no header. Both endpoints must be configured with the same
//! `frame_bytes` out of band; a mismatch is undetectable here.
//!
//! Variants:
//! - `tcp`: persistent stream, frames are fixed-length slices of the stream
//! - `udp`: one datagram per frame, loss is accepted silently
//! - `push`: WebSocket with a single-slot outbound work queue drained by an
//!   async driver task

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::audio::{FramePool, PcmFrame};
use crate::config::{Config, TransportKind};
use crate::error::TransportError;

pub mod push;
pub mod tcp;
pub mod udp;

/// Result of one send attempt. `WouldBlock` means the frame was dropped to
/// keep the capture cadence; the transport has already returned it to the
/// pool.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    WouldBlock,
}

/// Result of one bounded receive attempt.
#[derive(Debug)]
pub enum RecvOutcome {
    Frame(PcmFrame),
    TimedOut,
}

/// Outbound half of a session. Never blocks past its configured bound.
pub trait FrameSink: Send {
    fn send_frame(&mut self, frame: PcmFrame) -> Result<SendOutcome, TransportError>;
}

/// Inbound half of a session.
pub trait FrameSource: Send {
    fn recv_frame(&mut self, timeout: Duration) -> Result<RecvOutcome, TransportError>;
}

/// Lifecycle of one logical connection, tracked by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Draining,
    Closed,
}

/// One open conduit to the peer. Purely a pair of wire endpoints; all audio
/// state lives in the pipelines.
pub struct Session {
    pub id: Uuid,
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl Session {
    pub fn new(sink: Box<dyn FrameSink>, source: Box<dyn FrameSource>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sink,
            source,
        }
    }
}

/// Opens sessions for the lifecycle monitor.
pub trait SessionFactory: Send {
    fn open(&self, peer: &str, pool: Arc<FramePool>) -> Result<Session, TransportError>;
}

/// Production factory dispatching on the configured transport kind.
pub struct Opener {
    config: Config,
    handle: tokio::runtime::Handle,
}

impl Opener {
    pub fn new(config: Config, handle: tokio::runtime::Handle) -> Self {
        Self { config, handle }
    }
}

impl SessionFactory for Opener {
    fn open(&self, peer: &str, pool: Arc<FramePool>) -> Result<Session, TransportError> {
        log::info!("opening {:?} session to {}", self.config.transport, peer);
        let session = match self.config.transport {
            TransportKind::Tcp => tcp::open(&self.config, peer, pool),
            TransportKind::Udp => udp::open(&self.config, peer, pool),
            TransportKind::Ws => push::open(&self.config, peer, pool, &self.handle),
        }?;
        log::info!("session {} open", session.id);
        Ok(session)
    }
}
