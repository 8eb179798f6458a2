//! audio - Frames, the frame pool, and the hardware I/O ports.
//!
//! Uses ALSA for audio I/O. The relay moves raw S16LE PCM; there is no
//! codec in the path.

mod alsa_device;
pub mod frame;
pub mod port;

pub use frame::{FramePool, PcmFrame};
pub use port::{
    AlsaPortFactory, CaptureOutcome, CapturePort, PlaybackOutcome, PlaybackPort, PortFactory,
};
