//! Capture-to-network pipeline.
//!
//! The capture cadence is the timing authority: the loop never waits on the
//! network. Backpressure drops the frame, a capture timeout is a no-op
//! iteration, and only terminal conditions end the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{Direction, FaultReason, FaultReport, State, transition};
use crate::audio::{CaptureOutcome, CapturePort, FramePool};
use crate::transport::{FrameSink, SendOutcome};

pub fn run(
    mut port: Box<dyn CapturePort>,
    mut sink: Box<dyn FrameSink>,
    pool: Arc<FramePool>,
    running: Arc<AtomicBool>,
    events: mpsc::Sender<FaultReport>,
    io_timeout: Duration,
) {
    let mut state = State::Idle;
    transition(Direction::Capture, &mut state, State::Streaming);

    let fault = loop {
        if !running.load(Ordering::Relaxed) {
            break None;
        }

        let Some(mut frame) = pool.acquire() else {
            log::debug!("capture: frame pool exhausted, skipping cycle");
            thread::sleep(io_timeout);
            continue;
        };

        match port.capture(&mut frame, io_timeout) {
            Ok(CaptureOutcome::TimedOut) => {
                pool.release(frame);
            }
            Ok(CaptureOutcome::Filled) => match sink.send_frame(frame) {
                Ok(SendOutcome::Sent) => {}
                Ok(SendOutcome::WouldBlock) => {
                    log::debug!("capture: transport backpressure, frame dropped");
                }
                Err(e) => break Some(FaultReason::TransportClosed(e)),
            },
            Err(e) => {
                pool.release(frame);
                break Some(FaultReason::Device(e));
            }
        }
    };

    transition(Direction::Capture, &mut state, State::Stopped);

    if let Some(reason) = fault {
        log::error!("capture pipeline fault: {:?}", reason);
        let _ = events.blocking_send(FaultReport {
            direction: Direction::Capture,
            reason,
        });
    }
}
