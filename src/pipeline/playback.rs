//! Network-to-playback pipeline.
//!
//! Received frames are played in arrival order. While the push-to-talk key
//! is held the gate is closed and frames are discarded without playback,
//! which keeps the receive cadence and suppresses echo. A saturated sink
//! drops the frame; the loop never holds more than one frame of slack.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{Direction, FaultReason, FaultReport, State, transition};
use crate::audio::{FramePool, PlaybackOutcome, PlaybackPort};
use crate::gate::Gate;
use crate::transport::{FrameSource, RecvOutcome};

pub fn run(
    mut source: Box<dyn FrameSource>,
    mut port: Box<dyn PlaybackPort>,
    gate: Gate,
    pool: Arc<FramePool>,
    running: Arc<AtomicBool>,
    events: mpsc::Sender<FaultReport>,
    recv_timeout: Duration,
    io_timeout: Duration,
) {
    let mut state = State::Idle;
    transition(Direction::Playback, &mut state, State::Streaming);

    let fault = loop {
        if !running.load(Ordering::Relaxed) {
            break None;
        }

        match source.recv_frame(recv_timeout) {
            Ok(RecvOutcome::TimedOut) => {}
            Ok(RecvOutcome::Frame(frame)) => {
                if !gate.is_open() {
                    pool.release(frame);
                    continue;
                }
                match port.playback(&frame, io_timeout) {
                    Ok(PlaybackOutcome::Played) => pool.release(frame),
                    Ok(PlaybackOutcome::TimedOut) => {
                        log::debug!("playback: sink saturated, frame dropped");
                        pool.release(frame);
                    }
                    Err(e) => {
                        pool.release(frame);
                        break Some(FaultReason::Device(e));
                    }
                }
            }
            Err(e) => break Some(FaultReason::TransportClosed(e)),
        }
    };

    transition(Direction::Playback, &mut state, State::Stopped);

    if let Some(reason) = fault {
        log::error!("playback pipeline fault: {:?}", reason);
        let _ = events.blocking_send(FaultReport {
            direction: Direction::Playback,
            reason,
        });
    }
}
