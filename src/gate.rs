//! Push-to-talk gate: a sampled key line that mutes the playback path.
//!
//! Polarity follows the hardware: key held (line high) means the operator is
//! transmitting, so incoming audio is suppressed to avoid echo; key released
//! means the gate is open and received frames are played. Capture is never
//! gated. The line is sampled at a fixed interval well under one frame
//! period; there is no debounce.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::gpio::SysfsPin;

/// Shared gate level. Written only by the sampler, read by the playback
/// pipeline before every frame. Release/Acquire pairing keeps a freshly
/// sampled level visible to the audio thread.
#[derive(Clone)]
pub struct Gate {
    open: Arc<AtomicBool>,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        Self {
            open: Arc::new(AtomicBool::new(open)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }
}

/// A sampled binary input for the push-to-talk key.
pub trait GateSource: Send {
    /// Level of the key line; `true` means the key is held.
    fn pressed(&mut self) -> io::Result<bool>;
}

/// Key line on a sysfs GPIO.
pub struct GpioKey {
    pin: SysfsPin,
}

impl GpioKey {
    pub fn new(pin: u32) -> Self {
        Self {
            pin: SysfsPin::new(pin),
        }
    }
}

impl GateSource for GpioKey {
    fn pressed(&mut self) -> io::Result<bool> {
        self.pin.read()
    }
}

/// For boxes without a key line: the gate stays open and everything
/// received is played.
pub struct NoKey;

impl GateSource for NoKey {
    fn pressed(&mut self) -> io::Result<bool> {
        Ok(false)
    }
}

/// Dedicated thread that polls the key line and updates the gate.
pub struct Sampler {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn start(mut source: Box<dyn GateSource>, gate: Gate, poll: Duration) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("gate-sampler".into())
            .spawn(move || {
                let mut warned = false;
                let mut last_open = gate.is_open();
                while thread_running.load(Ordering::Relaxed) {
                    match source.pressed() {
                        Ok(pressed) => {
                            let open = !pressed;
                            if open != last_open {
                                log::debug!(
                                    "gate {}",
                                    if open { "open (key released)" } else { "closed (key held)" }
                                );
                                last_open = open;
                            }
                            gate.set_open(open);
                        }
                        Err(e) => {
                            // Keep the last level; a dead key line must not
                            // silence the relay.
                            if !warned {
                                log::warn!("gate source read failed: {}", e);
                                warned = true;
                            }
                        }
                    }
                    thread::sleep(poll);
                }
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SharedLevel(Arc<AtomicBool>);

    impl GateSource for SharedLevel {
        fn pressed(&mut self) -> io::Result<bool> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    fn wait_for(gate: &Gate, open: bool) -> bool {
        for _ in 0..200 {
            if gate.is_open() == open {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn key_press_closes_gate_within_a_few_polls() {
        let level = Arc::new(AtomicBool::new(false));
        let gate = Gate::new(true);
        let mut sampler = Sampler::start(
            Box::new(SharedLevel(level.clone())),
            gate.clone(),
            Duration::from_millis(1),
        )
        .unwrap();

        assert!(wait_for(&gate, true));

        level.store(true, Ordering::SeqCst);
        assert!(wait_for(&gate, false));

        level.store(false, Ordering::SeqCst);
        assert!(wait_for(&gate, true));

        sampler.stop();
    }

    #[test]
    fn no_key_source_leaves_gate_open() {
        let gate = Gate::new(false);
        let mut sampler =
            Sampler::start(Box::new(NoKey), gate.clone(), Duration::from_millis(1)).unwrap();
        assert!(wait_for(&gate, true));
        sampler.stop();
    }
}
