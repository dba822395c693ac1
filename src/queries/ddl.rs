use sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, SqliteQueryBuilder, Table};

use crate::schema::{Metadata, Metrics, Segments, Sessions, VideoChunks};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS sessions (
///     id TEXT PRIMARY KEY,
///     start_time INTEGER NOT NULL,
///     end_time INTEGER,
///     status TEXT NOT NULL,
///     route TEXT NOT NULL
/// )
pub fn create_sessions_table() -> String {
    Table::create()
        .table(Sessions::Table)
        .if_not_exists()
        .col(ColumnDef::new(Sessions::Id).string().primary_key())
        .col(ColumnDef::new(Sessions::StartTime).big_integer().not_null())
        .col(ColumnDef::new(Sessions::EndTime).big_integer().null())
        .col(ColumnDef::new(Sessions::Status).string().not_null())
        .col(ColumnDef::new(Sessions::Route).text().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS segments (
///     id TEXT PRIMARY KEY,
///     session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
///     video_chunk_id TEXT NOT NULL,
///     start_time INTEGER NOT NULL,
///     end_time INTEGER NOT NULL,
///     sensor_data TEXT NOT NULL
/// )
pub fn create_segments_table() -> String {
    Table::create()
        .table(Segments::Table)
        .if_not_exists()
        .col(ColumnDef::new(Segments::Id).string().primary_key())
        .col(ColumnDef::new(Segments::SessionId).string().not_null())
        .col(ColumnDef::new(Segments::VideoChunkId).string().not_null())
        .col(ColumnDef::new(Segments::StartTime).big_integer().not_null())
        .col(ColumnDef::new(Segments::EndTime).big_integer().not_null())
        .col(ColumnDef::new(Segments::SensorData).text().not_null())
        .foreign_key(
            ForeignKey::create()
                .from(Segments::Table, Segments::SessionId)
                .to(Sessions::Table, Sessions::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS video_chunks (
///     id TEXT PRIMARY KEY,
///     blob BLOB NOT NULL,
///     start_time INTEGER NOT NULL,
///     duration INTEGER NOT NULL
/// )
pub fn create_video_chunks_table() -> String {
    Table::create()
        .table(VideoChunks::Table)
        .if_not_exists()
        .col(ColumnDef::new(VideoChunks::Id).string().primary_key())
        .col(ColumnDef::new(VideoChunks::Blob).blob().not_null())
        .col(ColumnDef::new(VideoChunks::StartTime).big_integer().not_null())
        .col(ColumnDef::new(VideoChunks::Duration).big_integer().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS metrics (key TEXT PRIMARY KEY, used_space INTEGER NOT NULL, ...)
pub fn create_metrics_table() -> String {
    Table::create()
        .table(Metrics::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metrics::Key).string().primary_key())
        .col(ColumnDef::new(Metrics::UsedSpace).big_integer().not_null())
        .col(ColumnDef::new(Metrics::AvailableSpace).big_integer().not_null())
        .col(ColumnDef::new(Metrics::OldestSession).big_integer().not_null())
        .col(ColumnDef::new(Metrics::ActiveSegments).big_integer().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time)
pub fn create_sessions_start_time_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_sessions_start_time")
        .table(Sessions::Table)
        .col(Sessions::StartTime)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_segments_session_id ON segments(session_id)
pub fn create_segments_session_id_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_segments_session_id")
        .table(Segments::Table)
        .col(Segments::SessionId)
        .to_string(SqliteQueryBuilder)
}
