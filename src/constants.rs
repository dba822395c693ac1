/// Expected database schema version
/// Stores written with a different version are refused
pub const EXPECTED_DB_VERSION: &str = "1";

/// Nominal segment length (5 minutes)
pub const DEFAULT_SEGMENT_DURATION_SECS: u64 = 5 * 60;

/// Retention period for recorded sessions (in hours, ~1 week)
pub const DEFAULT_RETENTION_HOURS: i64 = 168;

/// Key of the singleton row in the metrics table
pub const STORAGE_METRICS_KEY: &str = "storage";

/// MIME type of the assembled segment artifacts
pub const VIDEO_MIME_TYPE: &str = "video/webm";

/// Back-to-back failed rotations after which the session is ended with
/// status `error`
pub const MAX_CONSECUTIVE_FAILED_ROTATIONS: u32 = 2;
