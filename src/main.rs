use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;

use walkie_linux_rs::audio::{AlsaPortFactory, FramePool};
use walkie_linux_rs::config::Config;
use walkie_linux_rs::gate::{Gate, GpioKey, Sampler};
use walkie_linux_rs::gpio::SysfsPin;
use walkie_linux_rs::link::{LifecycleMonitor, LinkEvent};
use walkie_linux_rs::transport::Opener;

/// Frames per pool; a handful per direction is plenty since each stage
/// holds at most one.
const POOL_FRAMES: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    let config = Config::new()?;
    log::info!(
        "walkie starting: transport={:?}, frame={}B ({:?}), rate={}Hz, ch={}",
        config.transport,
        config.frame_bytes,
        config.frame_period(),
        config.sample_rate,
        config.channels,
    );

    // 打开喇叭功放
    let amp = SysfsPin::new(config.amp_gpio);
    if let Err(e) = amp.write(true) {
        log::warn!("failed to enable amplifier on gpio {}: {}", config.amp_gpio, e);
    }

    let pool = Arc::new(FramePool::new(POOL_FRAMES, config.frame_bytes));

    // 按键采样，按下时静音播放
    let gate = Gate::new(true);
    let mut sampler = Sampler::start(
        Box::new(GpioKey::new(config.key_gpio)),
        gate.clone(),
        config.gate_poll(),
    )?;

    let (fault_tx, mut fault_rx) = mpsc::channel(16);
    let opener = Opener::new(config.clone(), tokio::runtime::Handle::current());
    let ports = AlsaPortFactory::new(config.clone());
    let mut monitor = LifecycleMonitor::new(
        Box::new(opener),
        Box::new(ports),
        pool,
        gate,
        fault_tx,
        config.io_timeout(),
        config.recv_timeout(),
    );

    // 连接建立回调每个会话只触发一次，携带已解析的对端地址
    monitor.handle_link(LinkEvent::Up(config.peer().to_string()))?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }
            Some(report) = fault_rx.recv() => {
                monitor.handle_fault(report);
            }
        }
    }

    monitor.handle_link(LinkEvent::Down)?;
    sampler.stop();
    Ok(())
}
