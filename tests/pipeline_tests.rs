//! Pipeline behavior against scripted ports and transports: ordering,
//! drop-on-backpressure, gating, and fault reporting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use walkie_linux_rs::audio::{
    CaptureOutcome, CapturePort, FramePool, PcmFrame, PlaybackOutcome, PlaybackPort,
};
use walkie_linux_rs::error::{PortError, TransportError};
use walkie_linux_rs::gate::Gate;
use walkie_linux_rs::pipeline::{self, Direction, FaultReport};
use walkie_linux_rs::transport::{FrameSink, FrameSource, RecvOutcome, SendOutcome};

const FRAME: usize = 64;
const TICK: Duration = Duration::from_millis(5);

// ---------------- capture side mocks ----------------

enum CaptureStep {
    Frame(u8),
    TimedOut,
    Fail,
}

/// Yields scripted outcomes; once the script runs dry it clears the running
/// flag so the loop under test winds down on its own.
struct ScriptedCapture {
    steps: VecDeque<CaptureStep>,
    running: Arc<AtomicBool>,
}

impl CapturePort for ScriptedCapture {
    fn capture(
        &mut self,
        frame: &mut PcmFrame,
        _timeout: Duration,
    ) -> Result<CaptureOutcome, PortError> {
        match self.steps.pop_front() {
            Some(CaptureStep::Frame(tag)) => {
                frame.fill_from(&[tag]);
                Ok(CaptureOutcome::Filled)
            }
            Some(CaptureStep::TimedOut) => Ok(CaptureOutcome::TimedOut),
            Some(CaptureStep::Fail) => Err(PortError::Device("mock capture fault".to_string())),
            None => {
                self.running.store(false, Ordering::SeqCst);
                Ok(CaptureOutcome::TimedOut)
            }
        }
    }
}

enum SinkStep {
    Sent,
    WouldBlock,
    Closed,
}

struct ScriptedSink {
    steps: VecDeque<SinkStep>,
    sent: Arc<Mutex<Vec<u8>>>,
    pool: Arc<FramePool>,
}

impl FrameSink for ScriptedSink {
    fn send_frame(&mut self, frame: PcmFrame) -> Result<SendOutcome, TransportError> {
        let tag = frame.bytes()[0];
        self.pool.release(frame);
        match self.steps.pop_front().unwrap_or(SinkStep::Sent) {
            SinkStep::Sent => {
                self.sent.lock().unwrap().push(tag);
                Ok(SendOutcome::Sent)
            }
            SinkStep::WouldBlock => Ok(SendOutcome::WouldBlock),
            SinkStep::Closed => Err(TransportError::Closed),
        }
    }
}

struct CaptureRun {
    sent: Arc<Mutex<Vec<u8>>>,
    faults: mpsc::Receiver<FaultReport>,
    pool: Arc<FramePool>,
}

fn run_capture(capture_steps: Vec<CaptureStep>, sink_steps: Vec<SinkStep>) -> CaptureRun {
    let pool = Arc::new(FramePool::new(4, FRAME));
    let running = Arc::new(AtomicBool::new(true));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let (fault_tx, faults) = mpsc::channel(4);

    let port = Box::new(ScriptedCapture {
        steps: capture_steps.into(),
        running: running.clone(),
    });
    let sink = Box::new(ScriptedSink {
        steps: sink_steps.into(),
        sent: sent.clone(),
        pool: pool.clone(),
    });

    pipeline::capture::run(port, sink, pool.clone(), running, fault_tx, TICK);
    CaptureRun { sent, faults, pool }
}

#[test]
fn capture_sends_frames_in_order() {
    let mut run = run_capture(
        vec![
            CaptureStep::Frame(1),
            CaptureStep::Frame(2),
            CaptureStep::Frame(3),
        ],
        vec![],
    );
    assert_eq!(*run.sent.lock().unwrap(), vec![1, 2, 3]);
    assert!(run.faults.try_recv().is_err());
    assert_eq!(run.pool.available(), 4);
}

#[test]
fn backpressure_drops_frames_without_blocking() {
    // F1..F5 back to back; the transport rejects F2 and F4.
    let mut run = run_capture(
        vec![
            CaptureStep::Frame(1),
            CaptureStep::Frame(2),
            CaptureStep::Frame(3),
            CaptureStep::Frame(4),
            CaptureStep::Frame(5),
        ],
        vec![
            SinkStep::Sent,
            SinkStep::WouldBlock,
            SinkStep::Sent,
            SinkStep::WouldBlock,
            SinkStep::Sent,
        ],
    );
    assert_eq!(*run.sent.lock().unwrap(), vec![1, 3, 5]);
    assert!(run.faults.try_recv().is_err());
    assert_eq!(run.pool.available(), 4);
}

#[test]
fn capture_timeout_is_a_noop_iteration() {
    let mut run = run_capture(
        vec![
            CaptureStep::TimedOut,
            CaptureStep::Frame(7),
            CaptureStep::TimedOut,
        ],
        vec![],
    );
    assert_eq!(*run.sent.lock().unwrap(), vec![7]);
    assert!(run.faults.try_recv().is_err());
}

#[test]
fn closed_transport_stops_capture_with_one_fault() {
    let mut run = run_capture(
        vec![
            CaptureStep::Frame(1),
            CaptureStep::Frame(2),
            CaptureStep::Frame(3),
        ],
        vec![SinkStep::Closed],
    );
    assert!(run.sent.lock().unwrap().is_empty());

    let report = run.faults.try_recv().expect("expected one fault");
    assert_eq!(report.direction, Direction::Capture);
    assert!(run.faults.try_recv().is_err(), "exactly one fault expected");
    // The frame handed to the transport still made it back to the pool.
    assert_eq!(run.pool.available(), 4);
}

#[test]
fn device_error_stops_capture_with_one_fault() {
    let mut run = run_capture(vec![CaptureStep::Frame(1), CaptureStep::Fail], vec![]);
    assert_eq!(*run.sent.lock().unwrap(), vec![1]);

    let report = run.faults.try_recv().expect("expected one fault");
    assert_eq!(report.direction, Direction::Capture);
    assert!(run.faults.try_recv().is_err());
    assert_eq!(run.pool.available(), 4);
}

// ---------------- playback side mocks ----------------

enum SourceStep {
    Frame(u8),
    TimedOut,
    Closed,
    OpenGate,
    CloseGate,
}

struct ScriptedSource {
    steps: VecDeque<SourceStep>,
    pool: Arc<FramePool>,
    gate: Gate,
    running: Arc<AtomicBool>,
}

impl FrameSource for ScriptedSource {
    fn recv_frame(&mut self, _timeout: Duration) -> Result<RecvOutcome, TransportError> {
        loop {
            match self.steps.pop_front() {
                Some(SourceStep::Frame(tag)) => {
                    let mut frame = self.pool.acquire().expect("pool must not be exhausted");
                    frame.fill_from(&[tag]);
                    return Ok(RecvOutcome::Frame(frame));
                }
                Some(SourceStep::TimedOut) => return Ok(RecvOutcome::TimedOut),
                Some(SourceStep::Closed) => return Err(TransportError::Closed),
                Some(SourceStep::OpenGate) => self.gate.set_open(true),
                Some(SourceStep::CloseGate) => self.gate.set_open(false),
                None => {
                    self.running.store(false, Ordering::SeqCst);
                    return Ok(RecvOutcome::TimedOut);
                }
            }
        }
    }
}

enum PlayStep {
    Played,
    TimedOut,
    Fail,
}

struct ScriptedPlayback {
    steps: VecDeque<PlayStep>,
    played: Arc<Mutex<Vec<u8>>>,
}

impl PlaybackPort for ScriptedPlayback {
    fn playback(
        &mut self,
        frame: &PcmFrame,
        _timeout: Duration,
    ) -> Result<PlaybackOutcome, PortError> {
        match self.steps.pop_front().unwrap_or(PlayStep::Played) {
            PlayStep::Played => {
                self.played.lock().unwrap().push(frame.bytes()[0]);
                Ok(PlaybackOutcome::Played)
            }
            PlayStep::TimedOut => Ok(PlaybackOutcome::TimedOut),
            PlayStep::Fail => Err(PortError::Device("mock playback fault".to_string())),
        }
    }
}

struct PlaybackRun {
    played: Arc<Mutex<Vec<u8>>>,
    faults: mpsc::Receiver<FaultReport>,
    pool: Arc<FramePool>,
}

fn run_playback(
    source_steps: Vec<SourceStep>,
    play_steps: Vec<PlayStep>,
    gate_open: bool,
) -> PlaybackRun {
    let pool = Arc::new(FramePool::new(4, FRAME));
    let running = Arc::new(AtomicBool::new(true));
    let gate = Gate::new(gate_open);
    let played = Arc::new(Mutex::new(Vec::new()));
    let (fault_tx, faults) = mpsc::channel(4);

    let source = Box::new(ScriptedSource {
        steps: source_steps.into(),
        pool: pool.clone(),
        gate: gate.clone(),
        running: running.clone(),
    });
    let port = Box::new(ScriptedPlayback {
        steps: play_steps.into(),
        played: played.clone(),
    });

    pipeline::playback::run(
        source,
        port,
        gate,
        pool.clone(),
        running,
        fault_tx,
        TICK,
        TICK,
    );
    PlaybackRun { played, faults, pool }
}

#[test]
fn playback_preserves_receive_order() {
    let mut run = run_playback(
        vec![
            SourceStep::Frame(1),
            SourceStep::TimedOut,
            SourceStep::Frame(2),
            SourceStep::Frame(3),
        ],
        vec![],
        true,
    );
    assert_eq!(*run.played.lock().unwrap(), vec![1, 2, 3]);
    assert!(run.faults.try_recv().is_err());
    assert_eq!(run.pool.available(), 4);
}

#[test]
fn closed_gate_discards_frames_until_reopened() {
    // Gate closed while F1 and F2 arrive, opened before F3.
    let mut run = run_playback(
        vec![
            SourceStep::Frame(1),
            SourceStep::Frame(2),
            SourceStep::OpenGate,
            SourceStep::Frame(3),
        ],
        vec![],
        false,
    );
    assert_eq!(*run.played.lock().unwrap(), vec![3]);
    assert!(run.faults.try_recv().is_err());
    assert_eq!(run.pool.available(), 4);
}

#[test]
fn gate_closing_takes_effect_for_the_next_frame() {
    let run = run_playback(
        vec![
            SourceStep::Frame(1),
            SourceStep::CloseGate,
            SourceStep::Frame(2),
            SourceStep::OpenGate,
            SourceStep::Frame(3),
        ],
        vec![],
        true,
    );
    assert_eq!(*run.played.lock().unwrap(), vec![1, 3]);
}

#[test]
fn saturated_sink_drops_the_frame_and_keeps_going() {
    let start = Instant::now();
    let mut run = run_playback(
        vec![
            SourceStep::Frame(1),
            SourceStep::Frame(2),
            SourceStep::Frame(3),
        ],
        vec![PlayStep::Played, PlayStep::TimedOut, PlayStep::Played],
        true,
    );
    assert_eq!(*run.played.lock().unwrap(), vec![1, 3]);
    assert!(run.faults.try_recv().is_err());
    assert_eq!(run.pool.available(), 4);
    // Dropping never stalls the loop past its bounded waits.
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn closed_transport_stops_playback_with_one_fault() {
    let mut run = run_playback(
        vec![SourceStep::Frame(1), SourceStep::Closed],
        vec![],
        true,
    );
    assert_eq!(*run.played.lock().unwrap(), vec![1]);

    let report = run.faults.try_recv().expect("expected one fault");
    assert_eq!(report.direction, Direction::Playback);
    assert!(run.faults.try_recv().is_err(), "exactly one fault expected");
    assert_eq!(run.pool.available(), 4);
}

#[test]
fn playback_device_error_stops_with_one_fault() {
    let mut run = run_playback(
        vec![SourceStep::Frame(1), SourceStep::Frame(2)],
        vec![PlayStep::Played, PlayStep::Fail],
        true,
    );
    assert_eq!(*run.played.lock().unwrap(), vec![1]);

    let report = run.faults.try_recv().expect("expected one fault");
    assert_eq!(report.direction, Direction::Playback);
    assert!(run.faults.try_recv().is_err());
    assert_eq!(run.pool.available(), 4);
}
