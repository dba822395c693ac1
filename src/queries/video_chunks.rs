use sea_query::{Expr, Query, SqliteQueryBuilder};

use crate::schema::VideoChunks;

/// INSERT INTO video_chunks (id, blob, start_time, duration) VALUES (?, ?, ?, ?)
/// ON CONFLICT (id) DO UPDATE SET ...
///
/// Written with placeholders instead of inlined values: a five minute
/// segment is tens of megabytes and goes through `sqlx` binds.
pub const UPSERT: &str = "INSERT INTO \"video_chunks\" (\"id\", \"blob\", \"start_time\", \"duration\") \
     VALUES (?, ?, ?, ?) \
     ON CONFLICT (\"id\") DO UPDATE SET \
     \"blob\" = excluded.\"blob\", \
     \"start_time\" = excluded.\"start_time\", \
     \"duration\" = excluded.\"duration\"";

/// SELECT id, blob, start_time, duration FROM video_chunks WHERE id = ?
pub fn select_by_id(id: &str) -> String {
    Query::select()
        .columns([
            VideoChunks::Id,
            VideoChunks::Blob,
            VideoChunks::StartTime,
            VideoChunks::Duration,
        ])
        .from(VideoChunks::Table)
        .and_where(Expr::col(VideoChunks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM video_chunks WHERE id = ?
pub fn delete_by_id(id: &str) -> String {
    Query::delete()
        .from_table(VideoChunks::Table)
        .and_where(Expr::col(VideoChunks::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
