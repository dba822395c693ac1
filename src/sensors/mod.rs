//! Motion and location sources.
//!
//! A source pushes raw readings into a [`TelemetrySink`] from whatever task
//! or callback it runs on; the returned [`SensorWatch`] keeps the
//! subscription alive and tears it down when dropped.

pub mod feed;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::telemetry::TelemetrySink;

pub use feed::FeedSensors;

/// One accelerometer event; axes the device did not report are `None`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// One position fix as reported by the location source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in m/s
    #[serde(default)]
    pub speed: Option<f64>,
    /// Degrees clockwise from true north
    #[serde(default)]
    pub heading: Option<f64>,
    /// Source-reported time; arrival time is what gets recorded
    #[serde(default)]
    pub timestamp: i64,
}

pub trait MotionSource: Send + Sync {
    fn watch_motion(&self, sink: TelemetrySink) -> Result<SensorWatch>;
}

#[async_trait]
pub trait LocationSource: Send + Sync {
    /// One-shot fix, used at session start and end
    async fn current_position(&self) -> Result<PositionFix>;

    /// Continuous fixes for the duration of a recording
    fn watch_position(&self, sink: TelemetrySink) -> Result<SensorWatch>;
}

/// Live subscription to a sensor source. Dropping it unsubscribes.
pub struct SensorWatch {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SensorWatch {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription with nothing to tear down
    pub fn detached() -> Self {
        Self { cancel: None }
    }
}

impl Drop for SensorWatch {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
