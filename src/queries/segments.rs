use sea_query::{Expr, Func, OnConflict, Order, Query, SqliteQueryBuilder};

use crate::schema::{Segments, Sessions};

const COLUMNS: [Segments; 6] = [
    Segments::Id,
    Segments::SessionId,
    Segments::VideoChunkId,
    Segments::StartTime,
    Segments::EndTime,
    Segments::SensorData,
];

/// INSERT INTO segments (id, session_id, video_chunk_id, start_time, end_time, sensor_data)
/// VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (id) DO UPDATE SET ...
pub fn upsert(
    id: &str,
    session_id: &str,
    video_chunk_id: &str,
    start_time: i64,
    end_time: i64,
    sensor_data_json: &str,
) -> String {
    Query::insert()
        .into_table(Segments::Table)
        .columns(COLUMNS)
        .values_panic([
            id.into(),
            session_id.into(),
            video_chunk_id.into(),
            start_time.into(),
            end_time.into(),
            sensor_data_json.into(),
        ])
        .on_conflict(
            OnConflict::column(Segments::Id)
                .update_columns([
                    Segments::SessionId,
                    Segments::VideoChunkId,
                    Segments::StartTime,
                    Segments::EndTime,
                    Segments::SensorData,
                ])
                .to_owned(),
        )
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, session_id, video_chunk_id, start_time, end_time, sensor_data
/// FROM segments WHERE session_id = ? ORDER BY start_time
pub fn select_by_session(session_id: &str) -> String {
    Query::select()
        .columns(COLUMNS)
        .from(Segments::Table)
        .and_where(Expr::col(Segments::SessionId).eq(session_id))
        .order_by(Segments::StartTime, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT video_chunk_id FROM segments WHERE session_id = ?
pub fn select_video_chunk_ids_by_session(session_id: &str) -> String {
    Query::select()
        .column(Segments::VideoChunkId)
        .from(Segments::Table)
        .and_where(Expr::col(Segments::SessionId).eq(session_id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM segments WHERE session_id = ?
pub fn delete_by_session(session_id: &str) -> String {
    Query::delete()
        .from_table(Segments::Table)
        .and_where(Expr::col(Segments::SessionId).eq(session_id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT COUNT(segments.id) FROM segments
/// INNER JOIN sessions ON sessions.id = segments.session_id
/// WHERE sessions.status = 'active'
pub fn count_for_active_sessions() -> String {
    Query::select()
        .expr(Func::count(Expr::col((Segments::Table, Segments::Id))))
        .from(Segments::Table)
        .inner_join(
            Sessions::Table,
            Expr::col((Sessions::Table, Sessions::Id))
                .equals((Segments::Table, Segments::SessionId)),
        )
        .and_where(Expr::col((Sessions::Table, Sessions::Status)).eq("active"))
        .to_string(SqliteQueryBuilder)
}
