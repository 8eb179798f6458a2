//! WebSocket push transport.
//!
//! Outbound frames are not written from the capture thread. `send_frame`
//! schedules the frame onto a single-slot work queue and returns; an async
//! driver task owns the socket, drains the queue and performs the actual
//! send. Scheduling success does not guarantee delivery. While a scheduled
//! frame is still unconsumed, new frames are rejected, which bounds the
//! queue to one frame per peer.
//!
//! On connect the driver announces the local audio parameters in a JSON
//! hello message so the operator can verify the out-of-band frame-size
//! contract from the peer's logs.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::connect_async;
use url::Url;

use super::{FrameSink, FrameSource, RecvOutcome, SendOutcome, Session};
use crate::audio::{FramePool, PcmFrame};
use crate::config::Config;
use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct AudioParams {
    format: &'static str,
    sample_rate: u32,
    channels: u32,
    frame_bytes: usize,
}

#[derive(Serialize)]
struct HelloMessage {
    #[serde(rename = "type")]
    msg_type: &'static str,
    version: u8,
    transport: &'static str,
    audio_params: AudioParams,
}

fn invalid_input(msg: String) -> TransportError {
    TransportError::Io(io::Error::new(io::ErrorKind::InvalidInput, msg))
}

/// Connect to the peer's WebSocket endpoint and start the driver task on
/// the given runtime. Returns once the socket is up and the hello message
/// is out, so connection failures surface here, before any pipeline starts.
pub fn open(
    config: &Config,
    ws_url: &str,
    pool: Arc<FramePool>,
    handle: &tokio::runtime::Handle,
) -> Result<Session, TransportError> {
    let url = Url::parse(ws_url).map_err(|e| invalid_input(format!("bad ws url '{}': {}", ws_url, e)))?;
    let host = url.host_str().unwrap_or_default().to_string();

    let request = Request::builder()
        .method("GET")
        .uri(ws_url)
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .body(())
        .map_err(|e| invalid_input(format!("bad ws request: {}", e)))?;

    let hello = HelloMessage {
        msg_type: "hello",
        version: 1,
        transport: "websocket",
        audio_params: AudioParams {
            format: "pcm",
            sample_rate: config.sample_rate,
            channels: config.channels,
            frame_bytes: config.frame_bytes,
        },
    };
    let hello_json = serde_json::to_string(&hello)
        .map_err(|e| TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let (slot_tx, slot_rx) = tokio::sync::mpsc::channel::<PcmFrame>(1);
    let (in_tx, in_rx) = std::sync::mpsc::sync_channel::<PcmFrame>(1);
    let (startup_tx, startup_rx) = std::sync::mpsc::sync_channel::<Result<(), String>>(1);

    handle.spawn(driver(request, hello_json, slot_rx, in_tx, pool.clone(), startup_tx));

    match startup_rx.recv_timeout(STARTUP_TIMEOUT) {
        Ok(Ok(())) => {}
        Ok(Err(msg)) => {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                msg,
            )));
        }
        Err(_) => {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "websocket connect timed out",
            )));
        }
    }

    Ok(Session::new(
        Box::new(PushFrameSink {
            slot: slot_tx,
            pool,
        }),
        Box::new(PushFrameSource { rx: in_rx }),
    ))
}

/// The worker that owns the socket: drains the outbound slot and feeds the
/// inbound channel. Exits on any socket failure; the dropped channel ends
/// both pipeline halves with `Closed`.
async fn driver(
    request: Request<()>,
    hello_json: String,
    mut slot_rx: tokio::sync::mpsc::Receiver<PcmFrame>,
    in_tx: SyncSender<PcmFrame>,
    pool: Arc<FramePool>,
    startup_tx: SyncSender<Result<(), String>>,
) {
    let ws_stream = match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request)).await {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            let _ = startup_tx.send(Err(format!("websocket connect failed: {}", e)));
            return;
        }
        Err(_) => {
            let _ = startup_tx.send(Err("websocket connect timed out".to_string()));
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    log::info!("Sending Hello: {}", hello_json);
    if let Err(e) = write.send(Message::Text(hello_json.into())).await {
        let _ = startup_tx.send(Err(format!("hello send failed: {}", e)));
        return;
    }
    let _ = startup_tx.send(Ok(()));

    let frame_bytes = pool.frame_bytes();
    loop {
        tokio::select! {
            scheduled = slot_rx.recv() => {
                match scheduled {
                    Some(frame) => {
                        let payload = Bytes::copy_from_slice(frame.bytes());
                        pool.release(frame);
                        if let Err(e) = write.send(Message::Binary(payload)).await {
                            log::warn!("websocket send failed: {}", e);
                            break;
                        }
                    }
                    // Sink dropped: the session is being torn down.
                    None => break,
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() != frame_bytes {
                            log::debug!(
                                "dropping websocket payload of {} bytes (expected {})",
                                data.len(),
                                frame_bytes
                            );
                            continue;
                        }
                        let Some(mut frame) = pool.acquire() else {
                            log::debug!("ws recv: frame pool exhausted, dropping payload");
                            continue;
                        };
                        frame.fill_from(&data);
                        match in_tx.try_send(frame) {
                            Ok(()) => {}
                            // Playback still holds the previous frame; keep
                            // at most one frame of slack.
                            Err(TrySendError::Full(frame)) => pool.release(frame),
                            Err(TrySendError::Disconnected(frame)) => {
                                pool.release(frame);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(close_frame))) => {
                        log::info!("server closed connection: {:?}", close_frame);
                        break;
                    }
                    // Text/ping/pong carry no audio
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("websocket receive failed: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    log::info!("websocket driver stopped");
}

pub struct PushFrameSink {
    slot: tokio::sync::mpsc::Sender<PcmFrame>,
    pool: Arc<FramePool>,
}

impl FrameSink for PushFrameSink {
    fn send_frame(&mut self, frame: PcmFrame) -> Result<SendOutcome, TransportError> {
        use tokio::sync::mpsc::error::TrySendError;
        match self.slot.try_send(frame) {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(TrySendError::Full(frame)) => {
                self.pool.release(frame);
                Ok(SendOutcome::WouldBlock)
            }
            Err(TrySendError::Closed(frame)) => {
                self.pool.release(frame);
                Err(TransportError::Closed)
            }
        }
    }
}

pub struct PushFrameSource {
    rx: Receiver<PcmFrame>,
}

impl FrameSource for PushFrameSource {
    fn recv_frame(&mut self, timeout: Duration) -> Result<RecvOutcome, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(RecvOutcome::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(RecvOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}
