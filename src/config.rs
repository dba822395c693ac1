use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CaptureConstraints, FacingMode};
use crate::constants::{DEFAULT_RETENTION_HOURS, DEFAULT_SEGMENT_DURATION_SECS};
use crate::error::{RecorderError, Result};
use crate::recorder::RecorderSettings;

fn default_segment_duration_secs() -> u64 {
    DEFAULT_SEGMENT_DURATION_SECS
}

fn default_retention_hours() -> i64 {
    DEFAULT_RETENTION_HOURS
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_api_port() -> u16 {
    3000
}

/// Recorder configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// SQLite database holding sessions, segments and video chunks
    pub database: PathBuf,
    /// Nominal segment length in seconds (default: 300)
    #[serde(default = "default_segment_duration_secs")]
    pub segment_duration_secs: u64,
    /// Sessions older than this are evicted before each recording (default: 168 hours = 1 week)
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    /// Capture device settings (maps to [capture] section in TOML)
    pub capture: CaptureConfig,
    /// Sensor settings (maps to [sensors] section in TOML)
    pub sensors: SensorsConfig,
    /// HTTP API settings (maps to [serve] section in TOML)
    #[serde(default)]
    pub serve: ServeConfig,
}

/// Capture configuration (maps to [capture] section in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Encoder program run once per segment, writing WebM to stdout (e.g. ffmpeg)
    pub program: String,
    /// Program arguments; `{device}`, `{facing_mode}`, `{width}` and `{height}` are substituted
    #[serde(default)]
    pub args: Vec<String>,
    /// Device node checked for access before recording (e.g. /dev/video0)
    pub device: Option<PathBuf>,
    /// Preferred camera: environment or user (default: environment)
    #[serde(default)]
    pub facing_mode: FacingMode,
    /// Preferred frame width (default: 1280)
    #[serde(default = "default_width")]
    pub width: u32,
    /// Preferred frame height (default: 720)
    #[serde(default = "default_height")]
    pub height: u32,
}

/// Sensor configuration (maps to [sensors] section in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    /// File or FIFO of newline-delimited JSON motion and position readings
    pub feed: PathBuf,
}

/// HTTP API configuration (maps to [serve] section in TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
    /// Port for the read-only session API (default: 3000)
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl RecorderConfig {
    /// Read and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RecorderConfig = toml::from_str(&content)?;
        config.validate().map_err(RecorderError::Config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.segment_duration_secs == 0 {
            return Err("segment_duration_secs must be greater than 0".to_string());
        }
        if self.retention_hours <= 0 {
            return Err("retention_hours must be greater than 0".to_string());
        }
        if self.capture.program.trim().is_empty() {
            return Err("[capture] program must not be empty".to_string());
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err("[capture] width and height must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention_hours * 3_600_000
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            segment_duration: Duration::from_secs(self.segment_duration_secs),
            constraints: CaptureConstraints {
                facing_mode: self.capture.facing_mode,
                width: self.capture.width,
                height: self.capture.height,
            },
        }
    }
}
