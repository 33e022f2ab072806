use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{FourCc, FrameGeometry};

/// Grab session configuration.
///
/// Defaults mirror the FPGA capture rig: `/dev/video5`, 640×480 RGB24,
/// 60 kernel buffers, a 2 s readiness timeout. Every field may be omitted
/// from a config file; see [`GrabConfig::apply_env`] for the environment
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabConfig {
    pub device: String,
    pub geometry: FrameGeometry,
    pub pixel_format: FourCc,
    pub buffer_count: u32,
    /// Readiness wait timeout in milliseconds; `None` blocks indefinitely.
    pub wait_timeout_ms: Option<u64>,
    /// Extra readiness waits attempted after a timeout before giving up.
    pub wait_retries: u32,
    pub output: String,
    /// Abort the frame scan loudly on a truncated frame instead of stopping
    /// quietly.
    pub strict_scan: bool,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video5".into(),
            geometry: FrameGeometry::VGA,
            pixel_format: FourCc::RGB24,
            buffer_count: 60,
            wait_timeout_ms: Some(2_000),
            wait_retries: 3,
            output: "out.raw".into(),
            strict_scan: false,
        }
    }
}

impl GrabConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Apply `FRAMELINK_*` environment overrides on top of this config.
    ///
    /// `FRAMELINK_TIMEOUT_MS=0` disables the readiness timeout entirely.
    pub fn apply_env(mut self) -> Self {
        if let Ok(device) = std::env::var("FRAMELINK_DEVICE") {
            self.device = device;
        }
        if let Ok(output) = std::env::var("FRAMELINK_OUTPUT") {
            self.output = output;
        }
        if let Ok(raw) = std::env::var("FRAMELINK_BUFFERS") {
            match raw.parse() {
                Ok(count) => self.buffer_count = count,
                Err(_) => warn!("Ignoring invalid FRAMELINK_BUFFERS={raw}"),
            }
        }
        if let Ok(raw) = std::env::var("FRAMELINK_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(0) => self.wait_timeout_ms = None,
                Ok(ms) => self.wait_timeout_ms = Some(ms),
                Err(_) => warn!("Ignoring invalid FRAMELINK_TIMEOUT_MS={raw}"),
            }
        }
        self
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}
