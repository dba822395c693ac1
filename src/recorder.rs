//! Recording orchestrator.
//!
//! A [`Recorder`] moves between idle and active. While active it owns the
//! in-progress session and segment, the capture handle, the telemetry
//! collector and the rotation timer. Every transition (`start`, `rotate`,
//! `stop`) runs under one async lock, so a `stop` arriving mid-rotation
//! waits for the rotation's commit and then runs.
//!
//! Segment boundaries are shared: a segment ends at the exact timestamp the
//! next one starts, and the session's start and end are the first segment's
//! start and the last segment's end.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, Mutex};

use crate::capture::{CaptureConstraints, CaptureDevice, CaptureHandle};
use crate::clock::Clock;
use crate::constants::{DEFAULT_SEGMENT_DURATION_SECS, MAX_CONSECUTIVE_FAILED_ROTATIONS};
use crate::error::{RecorderError, Result};
use crate::scheduler::SegmentScheduler;
use crate::sensors::{LocationSource, MotionSource, PositionFix};
use crate::store::SegmentStore;
use crate::telemetry::TelemetryCollector;
use crate::types::{GeoPoint, Segment, Session, SessionStatus, VideoChunk};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSettings {
    /// Nominal segment length
    pub segment_duration: Duration,
    pub constraints: CaptureConstraints,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            segment_duration: Duration::from_secs(DEFAULT_SEGMENT_DURATION_SECS),
            constraints: CaptureConstraints::default(),
        }
    }
}

/// Lifecycle notifications. `SegmentCommitted` is where finished video
/// artifacts are handed to downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    SessionStarted {
        session_id: String,
        start_time: i64,
    },
    SegmentCommitted {
        session_id: String,
        segment_id: String,
        artifact_name: String,
        bytes: usize,
        duration_ms: i64,
    },
    DeviceError {
        segment_id: String,
        message: String,
    },
    RotationFailed {
        session_id: String,
        message: String,
    },
    SessionEnded {
        session_id: String,
        status: SessionStatus,
    },
}

struct ActiveRecording {
    session: Session,
    segment: Segment,
    /// Set when the capture device failed to start the current segment
    capture_error: Option<String>,
    /// Rotations that failed back to back; reset by a successful one
    failed_rotations: u32,
    handle: Box<dyn CaptureHandle>,
    telemetry: TelemetryCollector,
    scheduler: SegmentScheduler,
}

impl ActiveRecording {
    /// The session with its route path brought up to date
    fn snapshot(&self) -> Session {
        let mut session = self.session.clone();
        session.route.path_points = self.telemetry.path_points();
        session
    }
}

struct Inner {
    store: Arc<SegmentStore>,
    capture: Arc<dyn CaptureDevice>,
    motion: Arc<dyn MotionSource>,
    location: Arc<dyn LocationSource>,
    clock: Arc<dyn Clock>,
    settings: RecorderSettings,
    state: Mutex<Option<ActiveRecording>>,
    events: broadcast::Sender<RecorderEvent>,
}

#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Inner>,
}

impl Recorder {
    pub fn new(
        store: Arc<SegmentStore>,
        capture: Arc<dyn CaptureDevice>,
        motion: Arc<dyn MotionSource>,
        location: Arc<dyn LocationSource>,
        clock: Arc<dyn Clock>,
        settings: RecorderSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                capture,
                motion,
                location,
                clock,
                settings,
                state: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RecorderEvent> {
        self.inner.events.subscribe()
    }

    pub async fn is_active(&self) -> bool {
        self.inner.state.lock().await.is_some()
    }

    /// Snapshot of the in-progress session
    pub async fn current_session(&self) -> Option<Session> {
        self.inner
            .state
            .lock()
            .await
            .as_ref()
            .map(ActiveRecording::snapshot)
    }

    /// Begin a new session and its first segment. Returns the session id.
    ///
    /// A refused capture device or location fix aborts the start; nothing
    /// is persisted in that case.
    pub async fn start(&self) -> Result<String> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        if let Some(active) = state.as_ref() {
            return Err(RecorderError::AlreadyActive(active.session.id.clone()));
        }

        let mut handle = inner.capture.acquire(inner.settings.constraints).await?;

        let fix = match inner.location.current_position().await {
            Ok(fix) => fix,
            Err(e) => {
                release_quietly(handle.as_mut()).await;
                return Err(e);
            }
        };

        let start_time = inner.clock.now_ms();
        let mut telemetry = TelemetryCollector::new(Arc::clone(&inner.clock));
        if let Err(e) = telemetry.subscribe(&*inner.motion, &*inner.location) {
            release_quietly(handle.as_mut()).await;
            return Err(e);
        }

        let session = Session::begin(start_time, Some(fix_to_point(&fix, start_time)));
        if let Err(e) = inner.store.put_session(&session).await {
            telemetry.unsubscribe();
            release_quietly(handle.as_mut()).await;
            return Err(e);
        }

        let segment = Segment::begin(&session.id, start_time);
        let mut active = ActiveRecording {
            session,
            segment,
            capture_error: None,
            failed_rotations: 0,
            handle,
            telemetry,
            scheduler: SegmentScheduler::new(),
        };
        begin_capture(&mut active).await;
        arm_rotation(inner, &mut active);

        let session_id = active.session.id.clone();
        info!("Recording session {} started", session_id);
        inner.emit(RecorderEvent::SessionStarted {
            session_id: session_id.clone(),
            start_time,
        });
        *state = Some(active);
        Ok(session_id)
    }

    /// Finalize the in-progress segment and begin the next one.
    ///
    /// The scheduler calls this at every boundary; it is public so callers
    /// can force a boundary. Returns the committed segment.
    pub async fn rotate(&self) -> Result<Segment> {
        let mut state = self.inner.state.lock().await;
        if state.is_none() {
            return Err(RecorderError::NotActive);
        }
        self.inner.rotate_locked(&mut state).await
    }

    /// Finalize the last segment and complete the session.
    ///
    /// Returns `NotActive` when idle. The capture device is released and
    /// telemetry unsubscribed even when the final commit fails; the session
    /// is then stored with status `error` and the failure returned.
    pub async fn stop(&self) -> Result<Session> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        let mut active = state.take().ok_or(RecorderError::NotActive)?;
        active.scheduler.cancel();

        let end_time = inner.clock.now_ms();
        let finalized = inner.finalize_segment(&mut active, end_time).await;
        active.telemetry.unsubscribe();
        if let Err(e) = &finalized {
            error!(
                "Failed to commit final segment of session {}: {}",
                active.session.id, e
            );
        }

        let end_location = match inner.location.current_position().await {
            Ok(fix) => Some(fix_to_point(&fix, end_time)),
            Err(e) => {
                warn!("No end location for session {}: {}", active.session.id, e);
                None
            }
        };

        let mut session = active.snapshot();
        session.end_time = Some(end_time);
        session.route.end_location = end_location;
        session.status = if finalized.is_ok() {
            SessionStatus::Completed
        } else {
            SessionStatus::Error
        };
        let persisted = inner.store.put_session(&session).await;

        release_quietly(active.handle.as_mut()).await;

        info!(
            "Recording session {} ended ({}, {} segments)",
            session.id,
            session.status,
            session.segments.len()
        );
        inner.emit(RecorderEvent::SessionEnded {
            session_id: session.id.clone(),
            status: session.status,
        });

        finalized?;
        persisted?;
        Ok(session)
    }
}

impl Inner {
    fn emit(&self, event: RecorderEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Scheduled end of `segment_id`. A timer whose segment was already
    /// finalized by another rotation, or whose session has ended, is ignored.
    async fn rotate_if_current(self: &Arc<Self>, segment_id: &str) {
        let mut state = self.state.lock().await;
        match state.as_ref() {
            Some(active) if active.segment.id == segment_id => {}
            _ => {
                debug!("Ignoring stale rotation for segment {}", segment_id);
                return;
            }
        }
        if let Err(e) = self.rotate_locked(&mut state).await {
            warn!("Scheduled rotation of segment {} failed: {}", segment_id, e);
        }
    }

    async fn rotate_locked(self: &Arc<Self>, state: &mut Option<ActiveRecording>) -> Result<Segment> {
        let Some(active) = state.as_mut() else {
            return Err(RecorderError::NotActive);
        };
        let boundary = self.clock.now_ms();

        let result = match self.finalize_segment(active, boundary).await {
            Ok(segment) => self
                .store
                .put_session(&active.snapshot())
                .await
                .map(|_| segment),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => active.failed_rotations = 0,
            Err(e) => {
                active.failed_rotations += 1;
                error!(
                    "Rotation of session {} failed ({} in a row): {}",
                    active.session.id, active.failed_rotations, e
                );
                self.emit(RecorderEvent::RotationFailed {
                    session_id: active.session.id.clone(),
                    message: e.to_string(),
                });
                let give_up = e.is_session_fatal()
                    || active.failed_rotations >= MAX_CONSECUTIVE_FAILED_ROTATIONS;
                if give_up {
                    if let Some(active) = state.take() {
                        self.abort_session(active, boundary).await;
                    }
                    return result;
                }
            }
        }

        active.segment = Segment::begin(&active.session.id, boundary);
        begin_capture(active).await;
        arm_rotation(self, active);
        result
    }

    /// Stop capture, drain telemetry up to `end_time`, and commit the
    /// segment with its video chunk. A capture failure still commits the
    /// segment, with an empty artifact.
    async fn finalize_segment(
        &self,
        active: &mut ActiveRecording,
        end_time: i64,
    ) -> Result<Segment> {
        let capture = match active.capture_error.take() {
            Some(message) => Err(message),
            None => active
                .handle
                .stop()
                .await
                .map(assemble_artifact)
                .map_err(|e| e.to_string()),
        };

        let mut segment = active.segment.clone();
        segment.end_time = end_time;
        segment.sensor_data = active.telemetry.drain_and_reset(end_time);

        let blob = match capture {
            Ok(blob) if !blob.is_empty() => blob,
            Ok(_) => {
                self.report_device_error(&segment, "capture produced no media".to_string());
                Bytes::new()
            }
            Err(message) => {
                self.report_device_error(&segment, message);
                Bytes::new()
            }
        };

        let chunk = VideoChunk {
            id: segment.video_chunk_id.clone(),
            blob,
            start_time: segment.start_time,
            duration: segment.duration_ms(),
        };
        self.store.commit_segment(&segment, &chunk).await?;

        debug!(
            "Committed segment {} of session {} ({} ms, {} bytes)",
            segment.id,
            segment.session_id,
            segment.duration_ms(),
            chunk.blob.len()
        );
        active.session.segments.push(segment.clone());

        self.emit(RecorderEvent::SegmentCommitted {
            session_id: segment.session_id.clone(),
            segment_id: segment.id.clone(),
            artifact_name: segment.artifact_name(),
            bytes: chunk.blob.len(),
            duration_ms: segment.duration_ms(),
        });
        Ok(segment)
    }

    fn report_device_error(&self, segment: &Segment, message: String) {
        warn!(
            "Capture failed for segment {}: {}; committing empty artifact",
            segment.id, message
        );
        self.emit(RecorderEvent::DeviceError {
            segment_id: segment.id.clone(),
            message,
        });
    }

    /// End a session that can no longer be written to
    async fn abort_session(&self, mut active: ActiveRecording, end_time: i64) {
        active.scheduler.cancel();
        active.telemetry.unsubscribe();
        let mut session = active.snapshot();
        session.end_time = Some(end_time);
        session.status = SessionStatus::Error;
        if let Err(e) = self.store.put_session(&session).await {
            error!("Could not mark session {} as failed: {}", session.id, e);
        }

        if let Err(e) = active.handle.stop().await {
            debug!("Capture already stopped: {}", e);
        }
        release_quietly(active.handle.as_mut()).await;

        error!("Recording session {} aborted", session.id);
        self.emit(RecorderEvent::SessionEnded {
            session_id: session.id,
            status: SessionStatus::Error,
        });
    }
}

fn arm_rotation(inner: &Arc<Inner>, active: &mut ActiveRecording) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let segment_id = active.segment.id.clone();
    active
        .scheduler
        .arm(inner.settings.segment_duration, move || {
            // Spawned so cancelling the timer cannot interrupt a rotation
            tokio::spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.rotate_if_current(&segment_id).await;
                }
            });
        });
}

async fn begin_capture(active: &mut ActiveRecording) {
    if let Err(e) = active.handle.start().await {
        warn!(
            "Capture did not start for segment {}: {}",
            active.segment.id, e
        );
        active.capture_error = Some(e.to_string());
    }
}

async fn release_quietly(handle: &mut dyn CaptureHandle) {
    if let Err(e) = handle.release().await {
        warn!("Failed to release capture device: {}", e);
    }
}

fn assemble_artifact(fragments: Vec<Bytes>) -> Bytes {
    if fragments.len() == 1 {
        return fragments.into_iter().next().unwrap_or_default();
    }
    let total = fragments.iter().map(Bytes::len).sum();
    let mut artifact = BytesMut::with_capacity(total);
    for fragment in &fragments {
        artifact.extend_from_slice(fragment);
    }
    artifact.freeze()
}

fn fix_to_point(fix: &PositionFix, timestamp: i64) -> GeoPoint {
    GeoPoint {
        latitude: fix.latitude,
        longitude: fix.longitude,
        timestamp,
    }
}
