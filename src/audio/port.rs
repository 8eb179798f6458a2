//! The audio I/O port contract and its ALSA implementation.
//!
//! Ports block the calling thread for at most the given timeout and never
//! retry internally. A timeout is a normal re-poll for the caller; a
//! `PortError` is terminal for that channel and tears the pipeline down.

use std::time::Duration;

use alsa::pcm::PCM;

use super::alsa_device;
use super::frame::PcmFrame;
use crate::config::Config;
use crate::error::PortError;

/// Result of one bounded capture attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The frame was filled to its full fixed size.
    Filled,
    /// No audio became available within the timeout.
    TimedOut,
}

/// Result of one bounded playback attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Played,
    /// The sink is saturated; the frame was not (fully) written.
    TimedOut,
}

pub trait CapturePort: Send {
    /// Fills `frame` with one fixed-size unit of PCM, waiting at most
    /// `timeout` for the device.
    fn capture(
        &mut self,
        frame: &mut PcmFrame,
        timeout: Duration,
    ) -> Result<CaptureOutcome, PortError>;
}

pub trait PlaybackPort: Send {
    /// Writes one frame to the device, waiting at most `timeout` for space.
    fn playback(
        &mut self,
        frame: &PcmFrame,
        timeout: Duration,
    ) -> Result<PlaybackOutcome, PortError>;
}

/// Opens the hardware ports for the lifecycle monitor. Failures here happen
/// before any pipeline starts and abort the whole start attempt.
pub trait PortFactory: Send {
    fn open_capture(&self) -> Result<Box<dyn CapturePort>, PortError>;
    fn open_playback(&self) -> Result<Box<dyn PlaybackPort>, PortError>;
}

fn device_err(e: anyhow::Error) -> PortError {
    PortError::Device(format!("{:#}", e))
}

/// Try to bring the PCM back after an XRUN. Success turns the failed cycle
/// into a timeout; failure is terminal.
fn recover(pcm: &PCM, dir: &str, e: alsa::Error) -> Result<(), PortError> {
    log::warn!("ALSA {} error: {}, recovering...", dir, e);
    pcm.prepare()
        .map_err(|e2| PortError::Device(format!("failed to recover PCM {}: {}", dir, e2)))
}

/// Capture streams sit in PREPARED until started and deliver nothing, so
/// recovery must restart the stream as well.
fn recover_capture(pcm: &PCM, e: alsa::Error) -> Result<(), PortError> {
    recover(pcm, "capture", e)?;
    pcm.start()
        .map_err(|e2| PortError::Device(format!("failed to restart PCM capture: {}", e2)))
}

/// ALSA capture port.
///
/// The frame buffer is zeroed before each read, so a partial period from the
/// device yields a zero-padded full-size frame rather than a short one. The
/// transport framing depends on this.
pub struct AlsaCapture {
    pcm: PCM,
    channels: usize,
    scratch: Vec<i16>,
}

impl AlsaCapture {
    pub fn open(config: &Config) -> Result<Self, PortError> {
        let (pcm, params) = alsa_device::open_capture(
            &config.capture_device,
            config.sample_rate,
            config.channels,
            config.frame_samples(),
        )
        .map_err(device_err)?;

        if params.sample_rate != config.sample_rate || params.channels != config.channels {
            log::warn!(
                "capture negotiated rate={}/ch={} differs from configured rate={}/ch={}",
                params.sample_rate,
                params.channels,
                config.sample_rate,
                config.channels,
            );
        }

        pcm.start()
            .map_err(|e| PortError::Device(format!("failed to start PCM capture: {}", e)))?;

        Ok(Self {
            pcm,
            channels: params.channels as usize,
            scratch: vec![0i16; config.frame_bytes / 2],
        })
    }
}

impl CapturePort for AlsaCapture {
    fn capture(
        &mut self,
        frame: &mut PcmFrame,
        timeout: Duration,
    ) -> Result<CaptureOutcome, PortError> {
        frame.zero();

        match self.pcm.wait(Some(timeout.as_millis() as u32)) {
            Ok(true) => {}
            Ok(false) => return Ok(CaptureOutcome::TimedOut),
            Err(e) => {
                recover_capture(&self.pcm, e)?;
                return Ok(CaptureOutcome::TimedOut);
            }
        }

        let io = self
            .pcm
            .io_i16()
            .map_err(|e| PortError::Device(format!("capture io: {}", e)))?;

        match io.readi(&mut self.scratch) {
            Ok(0) => Ok(CaptureOutcome::TimedOut),
            Ok(frames) => {
                let samples = (frames * self.channels).min(self.scratch.len());
                for (chunk, sample) in frame
                    .buf_mut()
                    .chunks_exact_mut(2)
                    .zip(&self.scratch[..samples])
                {
                    chunk.copy_from_slice(&sample.to_le_bytes());
                }
                // Zero-padded up to the fixed transport size
                frame.set_len(frame.capacity());
                Ok(CaptureOutcome::Filled)
            }
            Err(e) => {
                recover_capture(&self.pcm, e)?;
                Ok(CaptureOutcome::TimedOut)
            }
        }
    }
}

/// ALSA playback port. Short writes are retried across an XRUN recovery; if
/// the device stays behind, the rest of the frame is dropped so the receive
/// loop never stalls on the sink.
pub struct AlsaPlayback {
    pcm: PCM,
    channels: usize,
    scratch: Vec<i16>,
}

impl AlsaPlayback {
    pub fn open(config: &Config) -> Result<Self, PortError> {
        let (pcm, params) = alsa_device::open_playback(
            &config.playback_device,
            config.sample_rate,
            config.channels,
            config.frame_samples(),
        )
        .map_err(device_err)?;

        // 音量设置失败不影响播放
        if let Err(e) = alsa_device::set_playback_volume(&config.playback_device, config.volume) {
            log::warn!("Failed to set playback volume: {:#}", e);
        }

        Ok(Self {
            pcm,
            channels: params.channels as usize,
            scratch: vec![0i16; config.frame_bytes / 2],
        })
    }
}

impl PlaybackPort for AlsaPlayback {
    fn playback(
        &mut self,
        frame: &PcmFrame,
        timeout: Duration,
    ) -> Result<PlaybackOutcome, PortError> {
        match self.pcm.wait(Some(timeout.as_millis() as u32)) {
            Ok(true) => {}
            Ok(false) => return Ok(PlaybackOutcome::TimedOut),
            Err(e) => {
                recover(&self.pcm, "playback", e)?;
                return Ok(PlaybackOutcome::TimedOut);
            }
        }

        let bytes = frame.bytes();
        let samples = (bytes.len() / 2).min(self.scratch.len());
        for (sample, chunk) in self.scratch[..samples]
            .iter_mut()
            .zip(bytes.chunks_exact(2))
        {
            *sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        }

        let io = self
            .pcm
            .io_i16()
            .map_err(|e| PortError::Device(format!("playback io: {}", e)))?;

        let total_frames = samples / self.channels;
        let mut frames_written = 0;
        let mut retries = 0u32;

        while frames_written < total_frames {
            let offset = frames_written * self.channels;
            match io.writei(&self.scratch[offset..samples]) {
                Ok(n) => {
                    frames_written += n;
                    retries = 0;
                }
                Err(e) => {
                    recover(&self.pcm, "playback", e)?;
                    retries += 1;
                    if retries >= 3 {
                        log::warn!(
                            "playback still behind after {} recoveries, dropping {} frames",
                            retries,
                            total_frames - frames_written
                        );
                        return Ok(PlaybackOutcome::TimedOut);
                    }
                }
            }
        }

        Ok(PlaybackOutcome::Played)
    }
}

/// Production port factory backed by the ALSA devices from the config.
pub struct AlsaPortFactory {
    config: Config,
}

impl AlsaPortFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl PortFactory for AlsaPortFactory {
    fn open_capture(&self) -> Result<Box<dyn CapturePort>, PortError> {
        Ok(Box::new(AlsaCapture::open(&self.config)?))
    }

    fn open_playback(&self) -> Result<Box<dyn PlaybackPort>, PortError> {
        Ok(Box::new(AlsaPlayback::open(&self.config)?))
    }
}
