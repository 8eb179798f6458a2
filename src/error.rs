//! Error types for the relay.
//!
//! Transient conditions (capture/receive timeouts, send backpressure) are
//! expressed as `Ok` outcomes on the port and transport traits, never as
//! errors. Everything in here is terminal for the affected component.

use thiserror::Error;

/// Terminal transport failures. A transport never retries internally; any of
/// these stops the owning pipeline and reaches the lifecycle monitor.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport closed by peer")]
    Closed,

    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal audio device failures.
#[derive(Error, Debug)]
pub enum PortError {
    #[error("audio device failure: {0}")]
    Device(String),
}

/// Configuration problems. These are fatal at startup and are never
/// recovered from at runtime.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level error for the relay library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("audio error: {0}")]
    Port(#[from] PortError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
