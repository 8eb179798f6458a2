//! Connection lifecycle monitor.
//!
//! Starts the relay when the link comes up and tears it down on link loss
//! or on the first terminal pipeline fault. The external network-join layer
//! delivers link events with an already-resolved peer address; nothing here
//! resolves or retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::{FramePool, PortFactory};
use crate::error::Result;
use crate::gate::Gate;
use crate::pipeline::{self, FaultReport};
use crate::transport::{Session, SessionFactory, SessionState};

/// Connectivity events from the external join boundary.
#[derive(Debug)]
pub enum LinkEvent {
    /// Link established; carries the resolved peer address (or WebSocket
    /// URL for the push transport).
    Up(String),
    Down,
}

struct ActiveSession {
    id: Uuid,
    state: SessionState,
    capture: Option<JoinHandle<()>>,
    playback: Option<JoinHandle<()>>,
}

/// Run start/stop bodies outside the async control loop's reactor; plain
/// threads (tests) call straight through.
fn enter_blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(f),
        Err(_) => f(),
    }
}

pub struct LifecycleMonitor {
    sessions: Box<dyn SessionFactory>,
    ports: Box<dyn PortFactory>,
    pool: Arc<FramePool>,
    gate: Gate,
    events: mpsc::Sender<FaultReport>,
    io_timeout: Duration,
    recv_timeout: Duration,
    running: Arc<AtomicBool>,
    active: Option<ActiveSession>,
}

impl LifecycleMonitor {
    pub fn new(
        sessions: Box<dyn SessionFactory>,
        ports: Box<dyn PortFactory>,
        pool: Arc<FramePool>,
        gate: Gate,
        events: mpsc::Sender<FaultReport>,
        io_timeout: Duration,
        recv_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            ports,
            pool,
            gate,
            events,
            io_timeout,
            recv_timeout,
            running: Arc::new(AtomicBool::new(false)),
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn session_state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Closed, |active| active.state)
    }

    pub fn handle_link(&mut self, event: LinkEvent) -> Result<()> {
        match event {
            LinkEvent::Up(peer) => self.start(&peer),
            LinkEvent::Down => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Open a session and start both pipelines. A second start while the
    /// relay is running is a no-op, so duplicate link-up events are
    /// harmless. Any failure here happens before a pipeline has started.
    pub fn start(&mut self, peer: &str) -> Result<()> {
        if self.active.is_some() {
            log::warn!("start ignored: relay already running");
            return Ok(());
        }
        enter_blocking(|| self.start_inner(peer))
    }

    fn start_inner(&mut self, peer: &str) -> Result<()> {
        let session = self.sessions.open(peer, self.pool.clone())?;
        let capture_port = self.ports.open_capture()?;
        let playback_port = self.ports.open_playback()?;

        let Session { id, sink, source } = session;
        self.running.store(true, Ordering::SeqCst);

        let capture = {
            let pool = self.pool.clone();
            let running = self.running.clone();
            let events = self.events.clone();
            let io_timeout = self.io_timeout;
            thread::Builder::new().name("capture-pipe".into()).spawn(move || {
                pipeline::capture::run(capture_port, sink, pool, running, events, io_timeout)
            })?
        };

        let playback = {
            let pool = self.pool.clone();
            let running = self.running.clone();
            let events = self.events.clone();
            let gate = self.gate.clone();
            let recv_timeout = self.recv_timeout;
            let io_timeout = self.io_timeout;
            let spawned = thread::Builder::new().name("playback-pipe".into()).spawn(move || {
                pipeline::playback::run(
                    source,
                    playback_port,
                    gate,
                    pool,
                    running,
                    events,
                    recv_timeout,
                    io_timeout,
                )
            });
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    let _ = capture.join();
                    return Err(e.into());
                }
            }
        };

        self.active = Some(ActiveSession {
            id,
            state: SessionState::Open,
            capture: Some(capture),
            playback: Some(playback),
        });
        log::info!("relay started (session {})", id);
        Ok(())
    }

    /// Cooperative teardown: clears the stop flag, waits for both pipeline
    /// loops to notice it (bounded by one iteration's worst-case timeout),
    /// then releases the session. The pipeline threads own the session
    /// halves, so joining them is what closes the conduit. Idempotent.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.state = SessionState::Draining;
        log::info!("stopping relay (session {})", active.id);
        self.running.store(false, Ordering::SeqCst);

        enter_blocking(|| {
            if let Some(handle) = active.capture.take() {
                let _ = handle.join();
            }
            if let Some(handle) = active.playback.take() {
                let _ = handle.join();
            }
        });

        active.state = SessionState::Closed;
        log::info!("session {} closed", active.id);
    }

    /// First terminal fault tears the session down; late faults from the
    /// other pipeline of the same (already closed) session are ignored.
    pub fn handle_fault(&mut self, report: FaultReport) {
        if self.active.is_none() {
            log::debug!("fault after teardown ignored: {:?}", report.reason);
            return;
        }
        log::info!(
            "tearing down after {:?} pipeline fault: {:?}",
            report.direction,
            report.reason
        );
        self.stop();
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
