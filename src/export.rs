//! Session export documents.
//!
//! An export is a JSON document describing one session plus, for each
//! segment, a `videoUrl` pointing at the segment's video. Where that URL
//! points is up to the caller: relative file names for on-disk exports,
//! API paths for the HTTP server.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::error::Result;
use crate::store::{SegmentStore, SessionData};
use crate::types::{Route, Segment};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration: String,
    pub route: Route,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSegment {
    #[serde(flatten)]
    pub segment: Segment,
    pub video_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub session_info: SessionInfo,
    pub segments: Vec<ExportedSegment>,
}

/// File name of a session's export document
pub fn export_file_name(session_id: &str) -> String {
    format!("driving-session-{}.json", session_id)
}

/// Format elapsed milliseconds as `"<h>h <m>m"`, rounding down
pub fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Build the export document. Sessions still open are measured up to
/// `now_ms`.
pub fn build_session_export<F>(data: &SessionData, now_ms: i64, video_url: F) -> SessionExport
where
    F: Fn(&Segment) -> String,
{
    let session = &data.session;
    let end = session.end_time.unwrap_or(now_ms);

    SessionExport {
        session_info: SessionInfo {
            id: session.id.clone(),
            start_time: format_timestamp(session.start_time),
            end_time: session.end_time.map(format_timestamp),
            duration: format_duration(end - session.start_time),
            route: session.route.clone(),
        },
        segments: data
            .segments
            .iter()
            .map(|segment| ExportedSegment {
                segment: segment.clone(),
                video_url: video_url(segment),
            })
            .collect(),
    }
}

/// Write `driving-session-<id>.json` and one `segment-<id>.webm` per
/// segment into `out_dir`. Returns the path of the JSON document.
pub async fn write_session_export(
    store: &SegmentStore,
    session_id: &str,
    out_dir: &Path,
    now_ms: i64,
) -> Result<PathBuf> {
    let data = store.export_session_data(session_id).await?;
    tokio::fs::create_dir_all(out_dir).await?;

    for (segment, video) in data.segments.iter().zip(&data.videos) {
        tokio::fs::write(out_dir.join(segment.artifact_name()), &video.blob).await?;
    }

    let export = build_session_export(&data, now_ms, Segment::artifact_name);
    let json_path = out_dir.join(export_file_name(session_id));
    tokio::fs::write(&json_path, serde_json::to_vec_pretty(&export)?).await?;

    info!(
        "Exported session {} ({} segments) to {}",
        session_id,
        data.segments.len(),
        out_dir.display()
    );
    Ok(json_path)
}
