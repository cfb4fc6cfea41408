use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::imu::CycleTrigger;

pub const DEFAULT_CONFIG_PATH: &str = "mocap_server.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub imu: ImuConfig,
    #[serde(default)]
    pub skeleton: SkeletonConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 制御チャネルの待受アドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// メインループの周期 (Hz)
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// セッションフォルダの親ディレクトリ
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    /// BVHのキャプチャレート
    #[serde(default = "default_capture_fps")]
    pub capture_fps: f32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImuConfig {
    /// "HIP" などの関節名, "any", "all"
    #[serde(default)]
    pub cycle_trigger: CycleTrigger,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkeletonConfig {
    /// HEIGHT_ENTERED 前に録画開始した場合の身長 (m)
    #[serde(default = "default_height_m")]
    pub default_height_m: f32,
}

fn default_listen_addr() -> String { "0.0.0.0:7910".to_string() }
fn default_tick_hz() -> u32 { 60 }
fn default_sessions_dir() -> PathBuf { PathBuf::from("Sessions") }
fn default_capture_fps() -> f32 { 30.0 }
fn default_queue_capacity() -> usize { 512 }
fn default_read_timeout_ms() -> u64 { 200 }
fn default_height_m() -> f32 { 1.75 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tick_hz: default_tick_hz(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            capture_fps: default_capture_fps(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            cycle_trigger: CycleTrigger::default(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            default_height_m: default_height_m(),
        }
    }
}

impl ImuConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Falls back to defaults when the file is missing or invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("[config] {e:#}, using defaults");
                Self::default()
            }
        }
    }
}
