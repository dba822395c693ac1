//! Telemetry collection.
//!
//! Readings from the motion and location sources are stamped with their
//! arrival time and appended to one shared buffer. The recorder drains the
//! buffer at each segment boundary; a drain hands over everything that
//! arrived before the boundary and keeps the rest for the next segment, so
//! no reading lands in two segments or in none. Values are stored as
//! received, without smoothing.
//!
//! Position fixes are also appended to a session-wide route path as they
//! arrive. The path is never drained.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::sensors::{LocationSource, MotionEvent, MotionSource, PositionFix, SensorWatch};
use crate::types::{AccelerometerReading, GeoPoint, SensorData};

#[derive(Debug, Clone, Copy)]
struct PositionSample {
    point: GeoPoint,
    speed: f64,
    heading: f64,
}

#[derive(Debug, Default)]
struct TelemetryBuffer {
    accelerometer: Vec<AccelerometerReading>,
    positions: Vec<PositionSample>,
    path: Vec<GeoPoint>,
}

impl TelemetryBuffer {
    fn split_off_before(&mut self, boundary_ms: i64) -> SensorData {
        let (accelerometer, keep): (Vec<_>, Vec<_>) = mem::take(&mut self.accelerometer)
            .into_iter()
            .partition(|r| r.timestamp < boundary_ms);
        self.accelerometer = keep;

        let (drained, keep): (Vec<_>, Vec<_>) = mem::take(&mut self.positions)
            .into_iter()
            .partition(|p| p.point.timestamp < boundary_ms);
        self.positions = keep;

        let mut data = SensorData {
            accelerometer,
            ..SensorData::default()
        };
        for sample in drained {
            data.location.push(sample.point);
            data.speed.push(sample.speed);
            data.heading.push(sample.heading);
        }
        data
    }
}

struct Shared {
    clock: Arc<dyn Clock>,
    buffer: Mutex<TelemetryBuffer>,
    listening: AtomicBool,
}

impl Shared {
    fn buffer(&self) -> MutexGuard<'_, TelemetryBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle sources use to deliver readings into the collector.
/// Readings pushed while the collector is unsubscribed are dropped.
#[derive(Clone)]
pub struct TelemetrySink {
    shared: Arc<Shared>,
}

impl TelemetrySink {
    /// Missing axes are recorded as 0 so fixed-rate consumers stay aligned
    pub fn push_motion(&self, event: MotionEvent) {
        if !self.shared.listening.load(Ordering::SeqCst) {
            return;
        }
        let reading = AccelerometerReading {
            x: event.x.unwrap_or(0.0),
            y: event.y.unwrap_or(0.0),
            z: event.z.unwrap_or(0.0),
            timestamp: self.shared.clock.now_ms(),
        };
        self.shared.buffer().accelerometer.push(reading);
    }

    /// One fix feeds location, speed and heading together
    pub fn push_position(&self, fix: PositionFix) {
        if !self.shared.listening.load(Ordering::SeqCst) {
            return;
        }
        let sample = PositionSample {
            point: GeoPoint {
                latitude: fix.latitude,
                longitude: fix.longitude,
                timestamp: self.shared.clock.now_ms(),
            },
            speed: fix.speed.unwrap_or(0.0),
            heading: fix.heading.unwrap_or(0.0),
        };
        let mut buffer = self.shared.buffer();
        buffer.path.push(sample.point);
        buffer.positions.push(sample);
    }
}

pub struct TelemetryCollector {
    shared: Arc<Shared>,
    watches: Vec<SensorWatch>,
}

impl TelemetryCollector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                buffer: Mutex::new(TelemetryBuffer::default()),
                listening: AtomicBool::new(false),
            }),
            watches: Vec::new(),
        }
    }

    pub fn sink(&self) -> TelemetrySink {
        TelemetrySink {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Register with both sources. If the location watch cannot be set up
    /// the motion watch is torn down again.
    pub fn subscribe(
        &mut self,
        motion: &dyn MotionSource,
        location: &dyn LocationSource,
    ) -> Result<()> {
        if self.is_subscribed() {
            return Ok(());
        }
        self.shared.listening.store(true, Ordering::SeqCst);

        let watches = motion
            .watch_motion(self.sink())
            .and_then(|m| Ok(vec![m, location.watch_position(self.sink())?]));
        match watches {
            Ok(watches) => {
                self.watches = watches;
                Ok(())
            }
            Err(e) => {
                self.shared.listening.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }

    /// Hand over every reading stamped before `boundary_ms` and clear it
    /// from the buffer
    pub fn drain_and_reset(&self, boundary_ms: i64) -> SensorData {
        let data = self.shared.buffer().split_off_before(boundary_ms);
        debug!(
            "Drained {} motion readings and {} position fixes",
            data.accelerometer.len(),
            data.location.len()
        );
        data
    }

    /// Every position received since the collector was created, in order
    pub fn path_points(&self) -> Vec<GeoPoint> {
        self.shared.buffer().path.clone()
    }

    /// Safe to call repeatedly
    pub fn unsubscribe(&mut self) {
        self.shared.listening.store(false, Ordering::SeqCst);
        self.watches.clear();
    }
}

impl Drop for TelemetryCollector {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
