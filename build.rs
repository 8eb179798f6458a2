use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct Config {
    audio: Audio,
    network: Network,
    gate: Gate,
}

#[derive(Deserialize)]
struct Audio {
    capture_device: String,
    playback_device: String,
    sample_rate: u32,
    channels: u32,
    frame_bytes: usize,
    volume: u8,
    io_timeout_ms: u64,
}

#[derive(Deserialize)]
struct Network {
    transport: String,
    peer_addr: String,
    ws_url: String,
    local_port: u16,
    tcp_listen: bool,
    send_timeout_ms: u64,
    recv_timeout_ms: u64,
}

#[derive(Deserialize)]
struct Gate {
    key_gpio: u32,
    amp_gpio: u32,
    poll_ms: u64,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 音频配置
    println!("cargo:rustc-env=CAPTURE_DEVICE={}", config.audio.capture_device);
    println!("cargo:rustc-env=PLAYBACK_DEVICE={}", config.audio.playback_device);
    println!("cargo:rustc-env=SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=CHANNELS={}", config.audio.channels);
    println!("cargo:rustc-env=FRAME_BYTES={}", config.audio.frame_bytes);
    println!("cargo:rustc-env=VOLUME={}", config.audio.volume);
    println!("cargo:rustc-env=IO_TIMEOUT_MS={}", config.audio.io_timeout_ms);

    // 网络配置
    println!("cargo:rustc-env=TRANSPORT={}", config.network.transport);
    println!("cargo:rustc-env=PEER_ADDR={}", config.network.peer_addr);
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=LOCAL_PORT={}", config.network.local_port);
    println!("cargo:rustc-env=TCP_LISTEN={}", config.network.tcp_listen);
    println!("cargo:rustc-env=SEND_TIMEOUT_MS={}", config.network.send_timeout_ms);
    println!("cargo:rustc-env=RECV_TIMEOUT_MS={}", config.network.recv_timeout_ms);

    // 按键和功放配置
    println!("cargo:rustc-env=KEY_GPIO={}", config.gate.key_gpio);
    println!("cargo:rustc-env=AMP_GPIO={}", config.gate.amp_gpio);
    println!("cargo:rustc-env=GATE_POLL_MS={}", config.gate.poll_ms);
}
