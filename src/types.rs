//! Record types shared by the recorder, the store, and the export layer.
//!
//! All timestamps are epoch milliseconds. Field names serialize in camelCase
//! so exported documents keep the layout external viewers expect.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A latitude/longitude fix stamped with its arrival time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccelerometerReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: i64,
}

/// Telemetry covering one segment's `[start_time, end_time)` window.
///
/// `location`, `speed` and `heading` are parallel: entry `i` of each comes
/// from the same position fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    pub accelerometer: Vec<AccelerometerReading>,
    pub location: Vec<GeoPoint>,
    pub speed: Vec<f64>,
    pub heading: Vec<f64>,
}

impl SensorData {
    pub fn is_empty(&self) -> bool {
        self.accelerometer.is_empty() && self.location.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub start_location: Option<GeoPoint>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_location: Option<GeoPoint>,
    pub path_points: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "error" => Ok(SessionStatus::Error),
            other => Err(format!("Unknown session status '{}'", other)),
        }
    }
}

/// One fixed-duration slice of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub session_id: String,
    pub video_chunk_id: String,
    pub start_time: i64,
    /// 0 until the segment is finalized
    pub end_time: i64,
    pub sensor_data: SensorData,
}

impl Segment {
    /// Open a new segment; its video chunk shares its id.
    pub fn begin(session_id: &str, start_time: i64) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            video_chunk_id: id.clone(),
            id,
            session_id: session_id.to_string(),
            start_time,
            end_time: 0,
            sensor_data: SensorData::default(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time != 0
    }

    pub fn duration_ms(&self) -> i64 {
        if self.is_finalized() {
            self.end_time - self.start_time
        } else {
            0
        }
    }

    /// File name the segment's video is handed off and exported under
    pub fn artifact_name(&self) -> String {
        format!("segment-{}.webm", self.id)
    }
}

/// Raw media for one segment; `id` equals the segment's `video_chunk_id`
#[derive(Debug, Clone, PartialEq)]
pub struct VideoChunk {
    pub id: String,
    pub blob: Bytes,
    pub start_time: i64,
    pub duration: i64,
}

/// One continuous recording activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub route: Route,
    pub segments: Vec<Segment>,
    pub status: SessionStatus,
}

impl Session {
    pub fn begin(start_time: i64, start_location: Option<GeoPoint>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_time,
            end_time: None,
            route: Route {
                start_location,
                end_location: None,
                path_points: Vec::new(),
            },
            segments: Vec::new(),
            status: SessionStatus::Active,
        }
    }
}

/// Advisory storage summary kept as a singleton record
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetrics {
    pub used_space: i64,
    pub available_space: i64,
    pub oldest_session: i64,
    pub active_segments: i64,
}
