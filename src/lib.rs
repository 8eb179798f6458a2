//! walkie_linux_rs - full-duplex PCM audio relay (walkie-talkie core)
//!
//! Captures fixed-size raw PCM frames from the local codec, pushes them to a
//! remote peer over TCP, UDP or a WebSocket push channel, and plays the
//! peer's frames back, gated by a sampled push-to-talk key. No codec in the
//! path; both ends must agree on the frame size out of band.

pub mod audio;
pub mod config;
pub mod error;
pub mod gate;
pub mod gpio;
pub mod link;
pub mod pipeline;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
