//! Fixed-size PCM frames and the pre-allocated pool they come from.
//!
//! The relay never allocates in the hot path: every stage borrows a frame
//! from the pool, fills it, and moves it to the next stage by value. The
//! stage that consumes a frame is responsible for releasing it back.

use std::sync::Mutex;

/// One fixed-capacity unit of raw PCM audio.
///
/// Capacity equals the configured transport unit (`frame_bytes`); `len` is
/// how much of it is actually filled. On the wire frames are always full
/// length, so short fills are zero-padded by the producer.
#[derive(Debug)]
pub struct PcmFrame {
    data: Box<[u8]>,
    len: usize,
}

impl PcmFrame {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The filled portion of the frame.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole backing buffer, for producers that fill it in place.
    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Marks `len` bytes as filled.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.data.len());
        self.len = len;
    }

    /// Zeroes the buffer and resets the filled length.
    pub fn zero(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }

    /// Copies `src` into the frame, zero-padding the remainder. The frame is
    /// full length afterwards. `src` longer than the capacity is truncated.
    pub fn fill_from(&mut self, src: &[u8]) {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        self.data[n..].fill(0);
        self.len = self.data.len();
    }
}

/// Fixed set of reusable frames. Never grows after construction; exhaustion
/// means a stage is holding its frame longer than one cycle, and callers
/// skip the cycle instead of allocating.
pub struct FramePool {
    frames: Mutex<Vec<PcmFrame>>,
    frame_bytes: usize,
}

impl FramePool {
    pub fn new(count: usize, frame_bytes: usize) -> Self {
        let frames = (0..count).map(|_| PcmFrame::with_capacity(frame_bytes)).collect();
        Self {
            frames: Mutex::new(frames),
            frame_bytes,
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Takes a frame out of the pool, or `None` if all frames are in flight.
    pub fn acquire(&self) -> Option<PcmFrame> {
        self.frames.lock().unwrap().pop()
    }

    /// Returns a frame to the pool. Frames from a different pool are dropped.
    pub fn release(&self, mut frame: PcmFrame) {
        if frame.capacity() != self.frame_bytes {
            log::debug!(
                "dropping foreign frame (capacity {} != {})",
                frame.capacity(),
                self.frame_bytes
            );
            return;
        }
        frame.len = 0;
        self.frames.lock().unwrap().push(frame);
    }

    pub fn available(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}
