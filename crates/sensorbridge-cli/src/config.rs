//! Configuration file – reads/writes `~/.sensorbridge/config.toml`.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sensorbridge_runtime::{CaptureConfig, PoseConfig};
use sensorbridge_server::capture::DEFAULT_MAX_BODY_BYTES;
use sensorbridge_server::{DEFAULT_CAPTURE_PORT, DEFAULT_POSE_PORT};
use sensorbridge_types::BridgeError;
use serde::{Deserialize, Serialize};

/// Tracking backends the binary can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerBackend {
    /// In-process simulated tracker orbiting at desk height.
    #[default]
    Sim,
}

impl std::fmt::Display for TrackerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerBackend::Sim => write!(f, "sim"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub pose: PoseSection,
}

/// `[capture]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_capture_port")]
    pub port: u16,
    /// Largest accepted upload.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// `[pose]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_pose_port")]
    pub port: u16,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default)]
    pub tracker: TrackerBackend,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_capture_port() -> u16 {
    DEFAULT_CAPTURE_PORT
}
fn default_pose_port() -> u16 {
    DEFAULT_POSE_PORT
}
fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_capture_port(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for PoseSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_pose_port(),
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            tracker: TrackerBackend::default(),
        }
    }
}

impl CaptureSection {
    pub fn to_runtime(&self) -> Result<CaptureConfig, BridgeError> {
        Ok(CaptureConfig {
            addr: resolve(&self.host, self.port)?,
            max_body_bytes: self.max_body_bytes,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        })
    }
}

impl PoseSection {
    /// # Errors
    ///
    /// Rejects a zero `poll_interval_ms`, which would spin the poller.
    pub fn to_runtime(&self) -> Result<PoseConfig, BridgeError> {
        if self.poll_interval_ms == 0 {
            return Err(BridgeError::Config(
                "pose.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(PoseConfig {
            addr: resolve(&self.host, self.port)?,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        })
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| BridgeError::Config(format!("cannot resolve {host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| BridgeError::Config(format!("{host}:{port} resolved to no address")))
}

/// Return the path to `~/.sensorbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sensorbridge").join("config.toml")
}

/// Load the config from `path`, falling back to defaults when the file does
/// not exist, then apply environment overrides.
pub fn load_from(path: &Path) -> Result<Config, BridgeError> {
    let mut cfg = read_file(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse `path` without environment overrides.
pub(crate) fn read_file(path: &Path) -> Result<Config, BridgeError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `SENSORBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SENSORBRIDGE_CAPTURE_HOST` | `capture.host` |
/// | `SENSORBRIDGE_CAPTURE_PORT` | `capture.port` |
/// | `SENSORBRIDGE_POSE_HOST` | `pose.host` |
/// | `SENSORBRIDGE_POSE_PORT` | `pose.port` |
/// | `SENSORBRIDGE_POLL_INTERVAL_MS` | `pose.poll_interval_ms` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SENSORBRIDGE_CAPTURE_HOST") {
        cfg.capture.host = v;
    }
    if let Ok(v) = std::env::var("SENSORBRIDGE_CAPTURE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.capture.port = port;
    }
    if let Ok(v) = std::env::var("SENSORBRIDGE_POSE_HOST") {
        cfg.pose.host = v;
    }
    if let Ok(v) = std::env::var("SENSORBRIDGE_POSE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.pose.port = port;
    }
    if let Ok(v) = std::env::var("SENSORBRIDGE_POLL_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.pose.poll_interval_ms = ms;
    }
}

/// Save the config, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BridgeError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BridgeError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| BridgeError::Config(format!("failed to write {}: {e}", path.display())))
}
