//! Sensor feed read from a file or FIFO of newline-delimited JSON.
//!
//! ```text
//! {"kind":"motion","x":0.1,"y":-0.2,"z":9.8}
//! {"kind":"position","latitude":51.5,"longitude":-0.12,"speed":13.4,"heading":270}
//! ```

use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{LocationSource, MotionEvent, MotionSource, PositionFix, SensorWatch};
use crate::error::{RecorderError, Result};
use crate::telemetry::TelemetrySink;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum FeedReading {
    Motion(MotionEvent),
    Position(PositionFix),
}

#[derive(Debug, Clone, Copy, Default)]
struct FeedState {
    latest_fix: Option<PositionFix>,
    closed: bool,
}

#[derive(Default)]
struct Subscribers {
    motion: Option<TelemetrySink>,
    position: Option<TelemetrySink>,
}

/// Motion and location source backed by one JSON-lines feed
pub struct FeedSensors {
    subscribers: Arc<Mutex<Subscribers>>,
    state: Arc<watch::Sender<FeedState>>,
    reader: JoinHandle<()>,
}

impl FeedSensors {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => RecorderError::PermissionDenied(format!(
                "Cannot read sensor feed '{}': {}",
                path.display(),
                e
            )),
            _ => RecorderError::LocationUnavailable(format!(
                "Cannot open sensor feed '{}': {}",
                path.display(),
                e
            )),
        })?;
        info!("Reading sensor feed: {}", path.display());

        let subscribers = Arc::new(Mutex::new(Subscribers::default()));
        let (state, _) = watch::channel(FeedState::default());
        let state = Arc::new(state);

        let reader = tokio::spawn(read_feed(
            BufReader::new(file),
            Arc::clone(&subscribers),
            Arc::clone(&state),
        ));

        Ok(Self {
            subscribers,
            state,
            reader,
        })
    }

    fn set_subscriber(&self, apply: impl FnOnce(&mut Subscribers)) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        apply(&mut subscribers);
    }

    fn unsubscribe_with(&self, clear: fn(&mut Subscribers)) -> SensorWatch {
        let subscribers = Arc::clone(&self.subscribers);
        SensorWatch::new(move || {
            let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            clear(&mut subscribers);
        })
    }
}

impl Drop for FeedSensors {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_feed<R>(
    reader: BufReader<R>,
    subscribers: Arc<Mutex<Subscribers>>,
    state: Arc<watch::Sender<FeedState>>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Sensor feed read error: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reading: FeedReading = match serde_json::from_str(&line) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Skipping malformed sensor reading '{}': {}", line, e);
                continue;
            }
        };

        let subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        match reading {
            FeedReading::Motion(event) => {
                if let Some(sink) = &subscribers.motion {
                    sink.push_motion(event);
                }
            }
            FeedReading::Position(fix) => {
                if let Some(sink) = &subscribers.position {
                    sink.push_position(fix);
                }
                state.send_modify(|s| s.latest_fix = Some(fix));
            }
        }
    }

    info!("Sensor feed ended");
    state.send_modify(|s| s.closed = true);
}

impl MotionSource for FeedSensors {
    fn watch_motion(&self, sink: TelemetrySink) -> Result<SensorWatch> {
        self.set_subscriber(|s| s.motion = Some(sink));
        Ok(self.unsubscribe_with(|s| s.motion = None))
    }
}

#[async_trait]
impl LocationSource for FeedSensors {
    /// Latest fix seen on the feed, waiting for the first one if needed
    async fn current_position(&self) -> Result<PositionFix> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|s| s.latest_fix.is_some() || s.closed)
            .await
            .map_err(|_| RecorderError::LocationUnavailable("sensor feed dropped".to_string()))?;

        state.latest_fix.ok_or_else(|| {
            RecorderError::LocationUnavailable("sensor feed ended without a position fix".to_string())
        })
    }

    fn watch_position(&self, sink: TelemetrySink) -> Result<SensorWatch> {
        self.set_subscriber(|s| s.position = Some(sink));
        Ok(self.unsubscribe_with(|s| s.position = None))
    }
}
