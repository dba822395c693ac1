//! Durable session/segment/video-chunk store on SQLite.
//!
//! Two access patterns are indexed: every session in start-time order, and
//! every segment of one session. A segment and its video chunk are always
//! written in one transaction, and eviction removes a session together with
//! all of its segments and chunks in one transaction, so readers never see
//! half of a pair.

use bytes::Bytes;
use log::{debug, info};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::clock::{Clock, SystemClock};
use crate::db;
use crate::error::{RecorderError, Result};
use crate::queries::{metrics, segments, sessions, video_chunks};
use crate::types::{Route, Segment, SensorData, Session, SessionStatus, StorageMetrics, VideoChunk};

/// Everything needed to export one session
#[derive(Debug, Clone)]
pub struct SessionData {
    pub session: Session,
    pub segments: Vec<Segment>,
    pub videos: Vec<VideoChunk>,
}

/// Result of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub sessions: usize,
    pub segments: u64,
    pub video_chunks: u64,
}

pub struct SegmentStore {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
    initialized: AtomicBool,
}

impl SegmentStore {
    /// Wrap an existing pool. The store refuses every operation until
    /// [`SegmentStore::initialize`] has run.
    pub fn new(pool: SqlitePool, db_path: Option<PathBuf>) -> Self {
        Self {
            pool,
            db_path,
            initialized: AtomicBool::new(false),
        }
    }

    /// Open the database file and run the one-time schema setup
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::open_database_connection(db_path).await?;
        let store = Self::new(pool, Some(db_path.to_path_buf()));
        store.initialize().await?;
        Ok(store)
    }

    pub async fn initialize(&self) -> Result<()> {
        db::init_database_schema(&self.pool).await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RecorderError::StoreNotInitialized)
        }
    }

    pub async fn put_session(&self, session: &Session) -> Result<()> {
        self.ensure_initialized()?;
        let route = serde_json::to_string(&session.route)?;
        let sql = sessions::upsert(
            &session.id,
            session.start_time,
            session.end_time,
            session.status.as_str(),
            &route,
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn put_segment(&self, segment: &Segment) -> Result<()> {
        self.ensure_initialized()?;
        let mut tx = self.pool.begin().await?;
        write_segment(&mut tx, segment).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn put_video_chunk(&self, chunk: &VideoChunk) -> Result<()> {
        self.ensure_initialized()?;
        let mut tx = self.pool.begin().await?;
        write_video_chunk(&mut tx, chunk).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Commit a finished segment and its video chunk as one unit
    pub async fn commit_segment(&self, segment: &Segment, chunk: &VideoChunk) -> Result<()> {
        self.ensure_initialized()?;
        if segment.video_chunk_id != chunk.id {
            return Err(RecorderError::Config(format!(
                "Segment {} references chunk {} but chunk {} was supplied",
                segment.id, segment.video_chunk_id, chunk.id
            )));
        }

        let mut tx = self.pool.begin().await?;
        write_video_chunk(&mut tx, chunk).await?;
        write_segment(&mut tx, segment).await?;
        tx.commit().await?;

        debug!(
            "Committed segment {} ({} bytes, {} ms)",
            segment.id,
            chunk.blob.len(),
            chunk.duration
        );
        Ok(())
    }

    /// All sessions ordered by start time, each with its committed segments
    pub async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        self.ensure_initialized()?;
        let rows = sqlx::query(&sessions::select_all_by_start())
            .fetch_all(&self.pool)
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut session = session_from_row(&row)?;
            session.segments = self.get_segments_for_session(&session.id).await?;
            result.push(session);
        }
        Ok(result)
    }

    pub async fn get_session(&self, id: &str) -> Result<Session> {
        self.ensure_initialized()?;
        let row = sqlx::query(&sessions::select_by_id(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RecorderError::not_found("Session", id))?;

        let mut session = session_from_row(&row)?;
        session.segments = self.get_segments_for_session(id).await?;
        Ok(session)
    }

    /// Segments associated with a session, ordered by start time
    pub async fn get_segments_for_session(&self, session_id: &str) -> Result<Vec<Segment>> {
        self.ensure_initialized()?;
        let rows = sqlx::query(&segments::select_by_session(session_id))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(segment_from_row).collect()
    }

    pub async fn get_video_chunk(&self, id: &str) -> Result<VideoChunk> {
        self.ensure_initialized()?;
        let row = sqlx::query(&video_chunks::select_by_id(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RecorderError::not_found("Video chunk", id))?;

        Ok(VideoChunk {
            id: row.try_get("id")?,
            blob: Bytes::from(row.try_get::<Vec<u8>, _>("blob")?),
            start_time: row.try_get("start_time")?,
            duration: row.try_get("duration")?,
        })
    }

    /// Session, sorted segments, and the matching video chunks
    pub async fn export_session_data(&self, session_id: &str) -> Result<SessionData> {
        let session = self.get_session(session_id).await?;
        let segments = session.segments.clone();

        let mut videos = Vec::with_capacity(segments.len());
        for segment in &segments {
            videos.push(self.get_video_chunk(&segment.video_chunk_id).await?);
        }

        Ok(SessionData {
            session,
            segments,
            videos,
        })
    }

    /// Delete every session that started more than `max_age_ms` ago
    pub async fn evict_older_than(&self, max_age_ms: i64) -> Result<EvictionReport> {
        self.evict_older_than_at(max_age_ms, SystemClock.now_ms()).await
    }

    /// Eviction with an explicit reference time (for testing)
    ///
    /// Each old session is removed with its segments and chunks; the whole
    /// pass runs in one transaction and rolls back on any failure.
    pub async fn evict_older_than_at(&self, max_age_ms: i64, now_ms: i64) -> Result<EvictionReport> {
        self.ensure_initialized()?;
        let cutoff_ms = now_ms - max_age_ms;

        let mut tx = self.pool.begin().await?;
        let session_ids: Vec<String> =
            sqlx::query_scalar(&sessions::select_ids_started_before(cutoff_ms))
                .fetch_all(&mut *tx)
                .await?;

        let mut report = EvictionReport::default();
        for session_id in &session_ids {
            let chunk_ids: Vec<String> =
                sqlx::query_scalar(&segments::select_video_chunk_ids_by_session(session_id))
                    .fetch_all(&mut *tx)
                    .await?;

            for chunk_id in &chunk_ids {
                report.video_chunks += sqlx::query(&video_chunks::delete_by_id(chunk_id))
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }

            report.segments += sqlx::query(&segments::delete_by_session(session_id))
                .execute(&mut *tx)
                .await?
                .rows_affected();

            sqlx::query(&sessions::delete_by_id(session_id))
                .execute(&mut *tx)
                .await?;
            report.sessions += 1;
        }
        tx.commit().await?;

        if report.sessions > 0 {
            info!(
                "Evicted {} sessions ({} segments, {} video chunks) started before {}",
                report.sessions, report.segments, report.video_chunks, cutoff_ms
            );
        } else {
            debug!("No sessions older than {} to evict", cutoff_ms);
        }
        Ok(report)
    }

    pub async fn update_storage_metrics(&self, metrics: &StorageMetrics) -> Result<()> {
        self.ensure_initialized()?;
        sqlx::query(&metrics::upsert(metrics))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The stored metrics singleton, if maintenance has written it yet
    pub async fn get_storage_metrics(&self) -> Result<Option<StorageMetrics>> {
        self.ensure_initialized()?;
        let row = sqlx::query(&metrics::select())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(StorageMetrics {
                used_space: row.try_get("used_space")?,
                available_space: row.try_get("available_space")?,
                oldest_session: row.try_get("oldest_session")?,
                active_segments: row.try_get("active_segments")?,
            })
        })
        .transpose()
    }

    /// Recompute the metrics singleton from the database and persist it
    pub async fn refresh_storage_metrics(&self) -> Result<StorageMetrics> {
        self.ensure_initialized()?;

        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        let oldest: Option<i64> = sqlx::query_scalar(&sessions::select_oldest_start())
            .fetch_one(&self.pool)
            .await?;
        let active_segments: i64 = sqlx::query_scalar(&segments::count_for_active_sessions())
            .fetch_one(&self.pool)
            .await?;

        let available_space = match self.db_path.as_deref().and_then(Path::parent) {
            Some(dir) => {
                let dir = if dir.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    dir
                };
                i64::try_from(fs2::available_space(dir)?).unwrap_or(i64::MAX)
            }
            None => 0,
        };

        let metrics = StorageMetrics {
            used_space: page_count * page_size,
            available_space,
            oldest_session: oldest.unwrap_or(0),
            active_segments,
        };
        self.update_storage_metrics(&metrics).await?;
        Ok(metrics)
    }
}

async fn write_segment(tx: &mut Transaction<'_, Sqlite>, segment: &Segment) -> Result<()> {
    let sensor_data = serde_json::to_string(&segment.sensor_data)?;
    let sql = segments::upsert(
        &segment.id,
        &segment.session_id,
        &segment.video_chunk_id,
        segment.start_time,
        segment.end_time,
        &sensor_data,
    );
    sqlx::query(&sql).execute(&mut **tx).await?;
    Ok(())
}

async fn write_video_chunk(tx: &mut Transaction<'_, Sqlite>, chunk: &VideoChunk) -> Result<()> {
    sqlx::query(video_chunks::UPSERT)
        .bind(chunk.id.as_str())
        .bind(&chunk.blob[..])
        .bind(chunk.start_time)
        .bind(chunk.duration)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn session_from_row(row: &SqliteRow) -> Result<Session> {
    let status: String = row.try_get("status")?;
    let route: String = row.try_get("route")?;
    Ok(Session {
        id: row.try_get("id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        route: serde_json::from_str::<Route>(&route)?,
        segments: Vec::new(),
        status: status
            .parse::<SessionStatus>()
            .map_err(RecorderError::Config)?,
    })
}

fn segment_from_row(row: &SqliteRow) -> Result<Segment> {
    let sensor_data: String = row.try_get("sensor_data")?;
    Ok(Segment {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        video_chunk_id: row.try_get("video_chunk_id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        sensor_data: serde_json::from_str::<SensorData>(&sensor_data)?,
    })
}
