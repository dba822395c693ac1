//! Capture device boundary.
//!
//! A [`CaptureDevice`] hands out a [`CaptureHandle`] for the length of a
//! session. Each segment is one `start` / `stop` cycle on the handle; `stop`
//! returns the media fragments emitted since `start`.

pub mod command;

use async_trait::async_trait;
use bytes::Bytes;
use clap::ValueEnum;
use serde::Deserialize;

use crate::error::Result;

pub use command::CommandCapture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, facing the road
    #[default]
    Environment,
    /// Front camera, facing the driver
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

/// Preferred capture settings. Devices may deliver less.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing_mode: FacingMode,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            width: 1280,
            height: 720,
        }
    }
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device. Refused access is `RecorderError::PermissionDenied`.
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<Box<dyn CaptureHandle>>;
}

#[async_trait]
pub trait CaptureHandle: Send {
    async fn start(&mut self) -> Result<()>;

    /// End the current recording and return its fragments in arrival order
    async fn stop(&mut self) -> Result<Vec<Bytes>>;

    async fn release(&mut self) -> Result<()>;
}
