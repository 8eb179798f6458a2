//! Runtime configuration, baked in at compile time.
//!
//! `build.rs` reads `config.toml` and exports every setting as an
//! environment variable; `Config::new` parses them back. The configuration
//! is fixed once the relay starts: changing the audio format requires a
//! rebuild and full restart.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
    Ws,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "tcp" => Ok(TransportKind::Tcp),
            "udp" => Ok(TransportKind::Udp),
            "ws" => Ok(TransportKind::Ws),
            other => Err(ConfigError::Invalid {
                field: "network.transport",
                reason: format!("unknown transport '{}' (expected tcp, udp or ws)", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // 音频配置
    pub capture_device: String,
    pub playback_device: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub frame_bytes: usize,
    pub volume: u8,
    pub io_timeout_ms: u64,

    // 网络配置
    pub transport: TransportKind,
    pub peer_addr: String,
    pub ws_url: String,
    pub local_port: u16,
    pub tcp_listen: bool,
    pub send_timeout_ms: u64,
    pub recv_timeout_ms: u64,

    // 按键和功放配置
    pub key_gpio: u32,
    pub amp_gpio: u32,
    pub gate_poll_ms: u64,
}

fn parse<T: FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.parse().map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("'{}': {}", raw, e),
    })
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, ConfigError> {
        let config = Self {
            capture_device: env!("CAPTURE_DEVICE").to_string(),
            playback_device: env!("PLAYBACK_DEVICE").to_string(),
            sample_rate: parse("audio.sample_rate", env!("SAMPLE_RATE"))?,
            channels: parse("audio.channels", env!("CHANNELS"))?,
            frame_bytes: parse("audio.frame_bytes", env!("FRAME_BYTES"))?,
            volume: parse("audio.volume", env!("VOLUME"))?,
            io_timeout_ms: parse("audio.io_timeout_ms", env!("IO_TIMEOUT_MS"))?,

            transport: env!("TRANSPORT").parse()?,
            peer_addr: env!("PEER_ADDR").to_string(),
            ws_url: env!("WS_URL").to_string(),
            local_port: parse("network.local_port", env!("LOCAL_PORT"))?,
            tcp_listen: parse("network.tcp_listen", env!("TCP_LISTEN"))?,
            send_timeout_ms: parse("network.send_timeout_ms", env!("SEND_TIMEOUT_MS"))?,
            recv_timeout_ms: parse("network.recv_timeout_ms", env!("RECV_TIMEOUT_MS"))?,

            key_gpio: parse("gate.key_gpio", env!("KEY_GPIO"))?,
            amp_gpio: parse("gate.amp_gpio", env!("AMP_GPIO"))?,
            gate_poll_ms: parse("gate.poll_ms", env!("GATE_POLL_MS"))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 {
            return Err(ConfigError::Invalid {
                field: "audio.channels",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1024..=8192).contains(&self.frame_bytes) {
            return Err(ConfigError::Invalid {
                field: "audio.frame_bytes",
                reason: format!("{} is outside 1024..=8192", self.frame_bytes),
            });
        }
        let sample_bytes = 2 * self.channels as usize;
        if self.frame_bytes % sample_bytes != 0 {
            return Err(ConfigError::Invalid {
                field: "audio.frame_bytes",
                reason: format!(
                    "{} is not a multiple of one S16LE sample set ({} bytes)",
                    self.frame_bytes, sample_bytes
                ),
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "audio.sample_rate",
                reason: "must be non-zero".to_string(),
            });
        }
        for (field, value) in [
            ("audio.io_timeout_ms", self.io_timeout_ms),
            ("network.send_timeout_ms", self.send_timeout_ms),
            ("network.recv_timeout_ms", self.recv_timeout_ms),
            ("gate.poll_ms", self.gate_poll_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be non-zero".to_string(),
                });
            }
        }
        // Gate transitions must land within one frame of the key changing
        if self.gate_poll() >= self.frame_period() {
            return Err(ConfigError::Invalid {
                field: "gate.poll_ms",
                reason: format!(
                    "{}ms is not shorter than one frame period ({:?})",
                    self.gate_poll_ms,
                    self.frame_period()
                ),
            });
        }
        Ok(())
    }

    /// Frames (sample sets) per transport unit.
    pub fn frame_samples(&self) -> usize {
        self.frame_bytes / (2 * self.channels as usize)
    }

    /// Wall-clock duration of one frame.
    pub fn frame_period(&self) -> Duration {
        let micros = self.frame_samples() as u64 * 1_000_000 / u64::from(self.sample_rate);
        Duration::from_micros(micros)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn gate_poll(&self) -> Duration {
        Duration::from_millis(self.gate_poll_ms)
    }

    /// Peer address for the configured transport kind.
    pub fn peer(&self) -> &str {
        match self.transport {
            TransportKind::Ws => &self.ws_url,
            _ => &self.peer_addr,
        }
    }
}
