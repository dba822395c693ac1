use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

use drive_recorder::capture::{CaptureConstraints, CaptureDevice, CaptureHandle};
use drive_recorder::clock::{Clock, ManualClock, SystemClock};
use drive_recorder::error::{RecorderError, Result};
use drive_recorder::recorder::{Recorder, RecorderEvent, RecorderSettings};
use drive_recorder::sensors::{LocationSource, MotionEvent, MotionSource, PositionFix, SensorWatch};
use drive_recorder::store::SegmentStore;
use drive_recorder::telemetry::TelemetrySink;
use drive_recorder::types::{Session, SessionStatus};

const MINUTE_MS: i64 = 60_000;
const T0: i64 = 1_730_000_000_000;

// ============================================================================
// Fake devices
// ============================================================================

/// Capture device whose recordings emit "rec-<n>" and can be told to fail.
/// Holding a write lock on `stop_gate` blocks every `stop` until it drops.
#[derive(Default)]
struct FakeCapture {
    deny: AtomicBool,
    fail_recordings: Mutex<HashSet<usize>>,
    recordings: Arc<AtomicUsize>,
    acquired: AtomicUsize,
    released: Arc<AtomicUsize>,
    stop_gate: Arc<RwLock<()>>,
}

struct FakeHandle {
    recordings: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    stop_gate: Arc<RwLock<()>>,
    failing: HashSet<usize>,
    current: Option<usize>,
}

#[async_trait]
impl CaptureDevice for FakeCapture {
    async fn acquire(&self, _constraints: CaptureConstraints) -> Result<Box<dyn CaptureHandle>> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(RecorderError::PermissionDenied("camera refused".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            recordings: Arc::clone(&self.recordings),
            released: Arc::clone(&self.released),
            stop_gate: Arc::clone(&self.stop_gate),
            failing: self.fail_recordings.lock().unwrap().clone(),
            current: None,
        }))
    }
}

#[async_trait]
impl CaptureHandle for FakeHandle {
    async fn start(&mut self) -> Result<()> {
        self.current = Some(self.recordings.fetch_add(1, Ordering::SeqCst) + 1);
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<Bytes>> {
        let _open = self.stop_gate.read().await;
        let n = self
            .current
            .take()
            .ok_or_else(|| RecorderError::Device("not recording".to_string()))?;
        if self.failing.contains(&n) {
            return Err(RecorderError::Device("camera disconnected".to_string()));
        }
        Ok(vec![
            Bytes::from(format!("rec-{}", n)),
            Bytes::from_static(b"-tail"),
        ])
    }

    async fn release(&mut self) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Motion and location source driven by the test
#[derive(Default)]
struct FakeSensors {
    fix: Mutex<Option<PositionFix>>,
    deny: AtomicBool,
    motion_sink: Mutex<Option<TelemetrySink>>,
    position_sink: Mutex<Option<TelemetrySink>>,
}

impl FakeSensors {
    fn with_fix(latitude: f64, longitude: f64) -> Self {
        let sensors = Self::default();
        sensors.set_fix(Some((latitude, longitude)));
        sensors
    }

    fn set_fix(&self, fix: Option<(f64, f64)>) {
        *self.fix.lock().unwrap() = fix.map(|(latitude, longitude)| PositionFix {
            latitude,
            longitude,
            speed: None,
            heading: None,
            timestamp: 0,
        });
    }

    fn motion(&self, z: f64) {
        if let Some(sink) = self.motion_sink.lock().unwrap().as_ref() {
            sink.push_motion(MotionEvent {
                x: Some(0.0),
                y: None,
                z: Some(z),
            });
        }
    }

    fn position(&self, latitude: f64, speed: f64) {
        if let Some(sink) = self.position_sink.lock().unwrap().as_ref() {
            sink.push_position(PositionFix {
                latitude,
                longitude: 0.0,
                speed: Some(speed),
                heading: Some(90.0),
                timestamp: 0,
            });
        }
    }
}

impl MotionSource for FakeSensors {
    fn watch_motion(&self, sink: TelemetrySink) -> Result<SensorWatch> {
        *self.motion_sink.lock().unwrap() = Some(sink);
        Ok(SensorWatch::detached())
    }
}

#[async_trait]
impl LocationSource for FakeSensors {
    async fn current_position(&self) -> Result<PositionFix> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(RecorderError::PermissionDenied("location refused".to_string()));
        }
        let fix = *self.fix.lock().unwrap();
        fix.ok_or_else(|| RecorderError::LocationUnavailable("no fix".to_string()))
    }

    fn watch_position(&self, sink: TelemetrySink) -> Result<SensorWatch> {
        *self.position_sink.lock().unwrap() = Some(sink);
        Ok(SensorWatch::detached())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    recorder: Recorder,
    store: Arc<SegmentStore>,
    clock: ManualClock,
    capture: Arc<FakeCapture>,
    sensors: Arc<FakeSensors>,
    _guard: tempfile::TempDir,
}

/// Recorder on a temporary store with a manual clock at T0. The rotation
/// period is an hour so only explicit `rotate()` calls create boundaries.
async fn create_harness(capture: FakeCapture) -> Harness {
    let (pool, guard) = drive_recorder::db::create_test_connection_in_temporary_file()
        .await
        .unwrap();
    let store = Arc::new(SegmentStore::new(pool, None));
    store.initialize().await.unwrap();

    let clock = ManualClock::new(T0);
    let capture = Arc::new(capture);
    let sensors = Arc::new(FakeSensors::with_fix(51.5, -0.12));
    let recorder = Recorder::new(
        Arc::clone(&store),
        Arc::clone(&capture) as Arc<dyn CaptureDevice>,
        Arc::clone(&sensors) as Arc<dyn MotionSource>,
        Arc::clone(&sensors) as Arc<dyn LocationSource>,
        Arc::new(clock.clone()),
        RecorderSettings {
            segment_duration: Duration::from_secs(3600),
            ..RecorderSettings::default()
        },
    );

    Harness {
        recorder,
        store,
        clock,
        capture,
        sensors,
        _guard: guard,
    }
}

fn drain_events(rx: &mut broadcast::Receiver<RecorderEvent>) -> Vec<RecorderEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Make every segment insert fail, as a full disk would
async fn break_segment_writes(store: &SegmentStore) {
    sqlx::query(
        "CREATE TRIGGER reject_segments BEFORE INSERT ON segments \
         BEGIN SELECT RAISE(ABORT, 'database or disk is full'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();
}

async fn repair_segment_writes(store: &SegmentStore) {
    sqlx::query("DROP TRIGGER reject_segments")
        .execute(store.pool())
        .await
        .unwrap();
}

/// Segments of a session exactly cover [start, end) with shared boundaries
fn assert_tiles(session: &Session) {
    let end = session.end_time.expect("session should be ended");
    assert!(!session.segments.is_empty());
    assert_eq!(session.segments[0].start_time, session.start_time);
    for pair in session.segments.windows(2) {
        assert_eq!(pair[0].end_time, pair[1].start_time);
    }
    assert_eq!(session.segments.last().unwrap().end_time, end);
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_twelve_minute_session_has_three_segments() {
    let h = create_harness(FakeCapture::default()).await;

    let session_id = h.recorder.start().await.unwrap();
    assert!(h.recorder.is_active().await);

    h.clock.set(T0 + 5 * MINUTE_MS);
    h.recorder.rotate().await.unwrap();
    h.clock.set(T0 + 10 * MINUTE_MS);
    h.recorder.rotate().await.unwrap();
    h.clock.set(T0 + 12 * MINUTE_MS);
    let session = h.recorder.stop().await.unwrap();
    assert!(!h.recorder.is_active().await);

    assert_eq!(session.id, session_id);
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.start_time, T0);
    assert_eq!(session.end_time, Some(T0 + 12 * MINUTE_MS));

    let bounds: Vec<(i64, i64)> = session
        .segments
        .iter()
        .map(|s| ((s.start_time - T0) / MINUTE_MS, (s.end_time - T0) / MINUTE_MS))
        .collect();
    assert_eq!(bounds, vec![(0, 5), (5, 10), (10, 12)]);
    assert_tiles(&session);

    // The persisted view matches the in-memory one
    let stored = h.store.get_session(&session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.end_time, Some(T0 + 12 * MINUTE_MS));
    assert_eq!(stored.segments, session.segments);
    assert_eq!(stored.route.start_location.unwrap().latitude, 51.5);
    assert_eq!(stored.route.end_location.unwrap().timestamp, T0 + 12 * MINUTE_MS);

    for (i, segment) in stored.segments.iter().enumerate() {
        let chunk = h.store.get_video_chunk(&segment.video_chunk_id).await.unwrap();
        assert_eq!(chunk.id, segment.id);
        assert_eq!(chunk.blob, Bytes::from(format!("rec-{}-tail", i + 1)));
        assert_eq!(chunk.duration, segment.end_time - segment.start_time);
    }

    assert_eq!(h.capture.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_device_error_commits_empty_segment_and_continues() {
    let capture = FakeCapture::default();
    capture.fail_recordings.lock().unwrap().insert(2);
    let h = create_harness(capture).await;
    let mut events = h.recorder.subscribe_events();

    h.recorder.start().await.unwrap();
    h.clock.set(T0 + 5 * MINUTE_MS);
    h.recorder.rotate().await.unwrap();
    h.clock.set(T0 + 10 * MINUTE_MS);
    let failed = h.recorder.rotate().await.unwrap();
    h.clock.set(T0 + 15 * MINUTE_MS);
    let session = h.recorder.stop().await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.segments.len(), 3);
    assert_tiles(&session);
    assert_eq!(session.segments[1].id, failed.id);

    let empty = h.store.get_video_chunk(&failed.video_chunk_id).await.unwrap();
    assert!(empty.blob.is_empty());
    let third = h
        .store
        .get_video_chunk(&session.segments[2].video_chunk_id)
        .await
        .unwrap();
    assert_eq!(third.blob, Bytes::from_static(b"rec-3-tail"));

    let events = drain_events(&mut events);
    let device_errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RecorderEvent::DeviceError { segment_id, .. } => Some(segment_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(device_errors, vec![failed.id.clone()]);

    let committed = events
        .iter()
        .filter(|e| matches!(e, RecorderEvent::SegmentCommitted { .. }))
        .count();
    assert_eq!(committed, 3);
    assert!(matches!(
        events.last(),
        Some(RecorderEvent::SessionEnded {
            status: SessionStatus::Completed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_telemetry_is_windowed_per_segment() {
    let h = create_harness(FakeCapture::default()).await;
    h.recorder.start().await.unwrap();

    h.clock.set(T0 + MINUTE_MS);
    h.sensors.motion(9.8);
    h.clock.set(T0 + 2 * MINUTE_MS);
    h.sensors.position(51.6, 12.0);
    // Stamped exactly on the boundary, so it belongs to the next segment
    h.clock.set(T0 + 5 * MINUTE_MS);
    h.sensors.motion(9.7);
    h.recorder.rotate().await.unwrap();

    h.clock.set(T0 + 7 * MINUTE_MS);
    h.sensors.motion(9.6);
    h.sensors.position(51.7, 14.0);
    h.clock.set(T0 + 8 * MINUTE_MS);
    let session = h.recorder.stop().await.unwrap();

    let first = &session.segments[0].sensor_data;
    assert_eq!(first.accelerometer.len(), 1);
    assert_eq!(first.accelerometer[0].y, 0.0);
    assert_eq!(first.location.len(), 1);
    assert_eq!(first.speed, vec![12.0]);
    assert_eq!(first.heading, vec![90.0]);

    let second = &session.segments[1].sensor_data;
    assert_eq!(second.accelerometer.len(), 2);
    assert_eq!(second.accelerometer[0].timestamp, T0 + 5 * MINUTE_MS);
    assert_eq!(second.location[0].latitude, 51.7);

    for segment in &session.segments {
        let in_window = |t: i64| t >= segment.start_time && t < segment.end_time;
        assert!(segment.sensor_data.accelerometer.iter().all(|r| in_window(r.timestamp)));
        assert!(segment.sensor_data.location.iter().all(|p| in_window(p.timestamp)));
    }

    let path: Vec<f64> = session.route.path_points.iter().map(|p| p.latitude).collect();
    assert_eq!(path, vec![51.6, 51.7]);

    // Telemetry persisted with the segments
    let stored = h.store.get_segments_for_session(&session.id).await.unwrap();
    assert_eq!(stored[1].sensor_data, *second);

    // Readings after stop go nowhere
    h.sensors.motion(1.0);
    assert!(!h.recorder.is_active().await);
}

#[tokio::test]
async fn test_stop_when_idle_reports_not_active() {
    let h = create_harness(FakeCapture::default()).await;

    assert!(matches!(
        h.recorder.stop().await,
        Err(RecorderError::NotActive)
    ));
    assert!(matches!(
        h.recorder.rotate().await,
        Err(RecorderError::NotActive)
    ));
    assert!(h.store.get_all_sessions().await.unwrap().is_empty());

    // And again after a completed session
    h.recorder.start().await.unwrap();
    h.recorder.stop().await.unwrap();
    assert!(matches!(
        h.recorder.stop().await,
        Err(RecorderError::NotActive)
    ));
    assert_eq!(h.store.get_all_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_camera_permission_denied_creates_no_session() {
    let capture = FakeCapture::default();
    capture.deny.store(true, Ordering::SeqCst);
    let h = create_harness(capture).await;

    assert!(matches!(
        h.recorder.start().await,
        Err(RecorderError::PermissionDenied(_))
    ));
    assert!(!h.recorder.is_active().await);
    assert!(h.store.get_all_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_location_permission_denied_releases_camera() {
    let h = create_harness(FakeCapture::default()).await;
    h.sensors.deny.store(true, Ordering::SeqCst);

    assert!(matches!(
        h.recorder.start().await,
        Err(RecorderError::PermissionDenied(_))
    ));
    assert!(!h.recorder.is_active().await);
    assert!(h.store.get_all_sessions().await.unwrap().is_empty());
    assert_eq!(h.capture.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);

    // Access granted later: recording works
    h.sensors.deny.store(false, Ordering::SeqCst);
    h.recorder.start().await.unwrap();
    assert!(h.recorder.is_active().await);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let h = create_harness(FakeCapture::default()).await;
    let session_id = h.recorder.start().await.unwrap();

    match h.recorder.start().await {
        Err(RecorderError::AlreadyActive(active)) => assert_eq!(active, session_id),
        other => panic!("expected AlreadyActive, got {:?}", other),
    }
    assert_eq!(h.store.get_all_sessions().await.unwrap().len(), 1);
    assert_eq!(h.capture.acquired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_end_location_still_completes() {
    let h = create_harness(FakeCapture::default()).await;
    h.recorder.start().await.unwrap();

    h.sensors.set_fix(None);
    h.clock.set(T0 + MINUTE_MS);
    let session = h.recorder.stop().await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.route.end_location.is_none());
    assert!(session.route.start_location.is_some());
}

#[tokio::test]
async fn test_active_session_is_persisted_at_start() {
    let h = create_harness(FakeCapture::default()).await;
    let session_id = h.recorder.start().await.unwrap();

    let stored = h.store.get_session(&session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Active);
    assert_eq!(stored.start_time, T0);
    assert!(stored.end_time.is_none());
    assert!(stored.segments.is_empty());

    h.clock.set(T0 + 5 * MINUTE_MS);
    h.recorder.rotate().await.unwrap();
    let stored = h.store.get_session(&session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Active);
    assert_eq!(stored.segments.len(), 1);

    let current = h.recorder.current_session().await.unwrap();
    assert_eq!(current.segments.len(), 1);
}

#[tokio::test]
async fn test_stop_queued_behind_rotation() {
    let h = create_harness(FakeCapture::default()).await;
    h.recorder.start().await.unwrap();
    h.clock.set(T0 + 3 * MINUTE_MS);

    let (rotated, stopped) = tokio::join!(h.recorder.rotate(), h.recorder.stop());
    let rotated = rotated.unwrap();
    let session = stopped.unwrap();

    assert_eq!(session.segments.len(), 2);
    assert_eq!(session.segments[0].id, rotated.id);
    assert_tiles(&session);
    assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scheduler_rotates_on_its_own() {
    let (pool, _guard) = drive_recorder::db::create_test_connection_in_temporary_file()
        .await
        .unwrap();
    let store = Arc::new(SegmentStore::new(pool, None));
    store.initialize().await.unwrap();
    let sensors = Arc::new(FakeSensors::with_fix(1.0, 2.0));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let recorder = Recorder::new(
        Arc::clone(&store),
        Arc::new(FakeCapture::default()),
        Arc::clone(&sensors) as Arc<dyn MotionSource>,
        sensors as Arc<dyn LocationSource>,
        clock,
        RecorderSettings {
            segment_duration: Duration::from_millis(100),
            ..RecorderSettings::default()
        },
    );

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;
    let session = recorder.stop().await.unwrap();

    assert!(
        session.segments.len() >= 3,
        "expected scheduled rotations, got {} segments",
        session.segments.len()
    );
    assert_tiles(&session);

    // No rotation fires after stop
    tokio::time::sleep(Duration::from_millis(250)).await;
    let stored = store.get_segments_for_session(&session.id).await.unwrap();
    assert_eq!(stored.len(), session.segments.len());
}

#[tokio::test]
async fn test_path_points_visible_while_segment_is_open() {
    let h = create_harness(FakeCapture::default()).await;
    let session_id = h.recorder.start().await.unwrap();

    h.clock.set(T0 + MINUTE_MS);
    h.sensors.position(51.6, 10.0);

    let current = h.recorder.current_session().await.unwrap();
    assert!(current.segments.is_empty());
    assert_eq!(current.route.path_points.len(), 1);
    assert_eq!(current.route.path_points[0].timestamp, T0 + MINUTE_MS);

    h.clock.set(T0 + 5 * MINUTE_MS);
    h.recorder.rotate().await.unwrap();
    let stored = h.store.get_session(&session_id).await.unwrap();
    assert_eq!(stored.route.path_points.len(), 1);
}

#[tokio::test]
async fn test_failed_rotation_continues_into_next_segment() {
    let h = create_harness(FakeCapture::default()).await;
    let mut events = h.recorder.subscribe_events();
    let session_id = h.recorder.start().await.unwrap();

    h.clock.set(T0 + 2 * MINUTE_MS);
    h.sensors.position(51.6, 10.0);
    h.clock.set(T0 + 5 * MINUTE_MS);
    break_segment_writes(&h.store).await;
    assert!(matches!(
        h.recorder.rotate().await,
        Err(RecorderError::Database(_))
    ));
    assert!(h.recorder.is_active().await);
    assert_eq!(
        h.store.get_session(&session_id).await.unwrap().status,
        SessionStatus::Active
    );

    repair_segment_writes(&h.store).await;
    h.clock.set(T0 + 10 * MINUTE_MS);
    let next = h.recorder.rotate().await.unwrap();
    assert_eq!(next.start_time, T0 + 5 * MINUTE_MS);

    // A later failure is not consecutive with the first one
    h.clock.set(T0 + 12 * MINUTE_MS);
    break_segment_writes(&h.store).await;
    assert!(h.recorder.rotate().await.is_err());
    assert!(h.recorder.is_active().await);
    repair_segment_writes(&h.store).await;

    h.clock.set(T0 + 15 * MINUTE_MS);
    let session = h.recorder.stop().await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.segments.len(), 2);
    assert_eq!(session.segments[0].id, next.id);
    // The lost segment's route is kept
    assert_eq!(session.route.path_points.len(), 1);
    assert_eq!(session.route.path_points[0].latitude, 51.6);

    let failures = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, RecorderEvent::RotationFailed { .. }))
        .count();
    assert_eq!(failures, 2);
}

#[tokio::test]
async fn test_repeated_rotation_failures_end_session_with_error() {
    let h = create_harness(FakeCapture::default()).await;
    let mut events = h.recorder.subscribe_events();
    let session_id = h.recorder.start().await.unwrap();
    break_segment_writes(&h.store).await;

    h.clock.set(T0 + 5 * MINUTE_MS);
    assert!(h.recorder.rotate().await.is_err());
    assert!(h.recorder.is_active().await);

    h.clock.set(T0 + 10 * MINUTE_MS);
    assert!(h.recorder.rotate().await.is_err());
    assert!(!h.recorder.is_active().await);

    let stored = h.store.get_session(&session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Error);
    assert_eq!(stored.end_time, Some(T0 + 10 * MINUTE_MS));
    assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);

    assert!(matches!(
        drain_events(&mut events).last(),
        Some(RecorderEvent::SessionEnded {
            status: SessionStatus::Error,
            ..
        })
    ));
    assert!(matches!(
        h.recorder.stop().await,
        Err(RecorderError::NotActive)
    ));
}

#[tokio::test]
async fn test_failed_final_commit_marks_session_error() {
    let h = create_harness(FakeCapture::default()).await;
    let session_id = h.recorder.start().await.unwrap();

    h.clock.set(T0 + 5 * MINUTE_MS);
    h.recorder.rotate().await.unwrap();
    break_segment_writes(&h.store).await;
    h.clock.set(T0 + 7 * MINUTE_MS);
    assert!(h.recorder.stop().await.is_err());

    assert!(!h.recorder.is_active().await);
    let stored = h.store.get_session(&session_id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Error);
    assert_eq!(stored.segments.len(), 1);
    assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timer_firing_during_manual_rotation_is_ignored() {
    let (pool, _guard) = drive_recorder::db::create_test_connection_in_temporary_file()
        .await
        .unwrap();
    let store = Arc::new(SegmentStore::new(pool, None));
    store.initialize().await.unwrap();
    let sensors = Arc::new(FakeSensors::with_fix(1.0, 2.0));
    let capture = Arc::new(FakeCapture::default());

    let recorder = Recorder::new(
        Arc::clone(&store),
        Arc::clone(&capture) as Arc<dyn CaptureDevice>,
        Arc::clone(&sensors) as Arc<dyn MotionSource>,
        sensors as Arc<dyn LocationSource>,
        Arc::new(SystemClock),
        RecorderSettings {
            segment_duration: Duration::from_millis(400),
            ..RecorderSettings::default()
        },
    );
    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Hold the manual rotation inside capture stop until after the timer fires
    let gate = capture.stop_gate.write().await;
    let manual = tokio::spawn({
        let recorder = recorder.clone();
        async move { recorder.rotate().await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(gate);
    let rotated = manual.await.unwrap().unwrap();

    // The next scheduled boundary is a full period after the manual one
    tokio::time::sleep(Duration::from_millis(150)).await;
    let current = recorder.current_session().await.unwrap();
    assert_eq!(current.segments.len(), 1);
    assert_eq!(current.segments[0].id, rotated.id);

    let session = recorder.stop().await.unwrap();
    assert_eq!(session.segments.len(), 2);
    assert!(session.segments[1].duration_ms() >= 100);
    assert_tiles(&session);
}
