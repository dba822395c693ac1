use sea_query::{Expr, Func, OnConflict, Order, Query, SqliteQueryBuilder};

use crate::schema::Sessions;

const COLUMNS: [Sessions; 5] = [
    Sessions::Id,
    Sessions::StartTime,
    Sessions::EndTime,
    Sessions::Status,
    Sessions::Route,
];

/// INSERT INTO sessions (id, start_time, end_time, status, route) VALUES (?, ?, ?, ?, ?)
/// ON CONFLICT (id) DO UPDATE SET start_time, end_time, status, route
///
/// An update in place rather than REPLACE: a replace deletes the row first,
/// which would cascade into the session's segments.
pub fn upsert(
    id: &str,
    start_time: i64,
    end_time: Option<i64>,
    status: &str,
    route_json: &str,
) -> String {
    Query::insert()
        .into_table(Sessions::Table)
        .columns(COLUMNS)
        .values_panic([
            id.into(),
            start_time.into(),
            end_time.into(),
            status.into(),
            route_json.into(),
        ])
        .on_conflict(
            OnConflict::column(Sessions::Id)
                .update_columns([
                    Sessions::StartTime,
                    Sessions::EndTime,
                    Sessions::Status,
                    Sessions::Route,
                ])
                .to_owned(),
        )
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, start_time, end_time, status, route FROM sessions ORDER BY start_time
pub fn select_all_by_start() -> String {
    Query::select()
        .columns(COLUMNS)
        .from(Sessions::Table)
        .order_by(Sessions::StartTime, Order::Asc)
        .order_by(Sessions::Id, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, start_time, end_time, status, route FROM sessions WHERE id = ?
pub fn select_by_id(id: &str) -> String {
    Query::select()
        .columns(COLUMNS)
        .from(Sessions::Table)
        .and_where(Expr::col(Sessions::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT id FROM sessions WHERE start_time < ?
pub fn select_ids_started_before(cutoff_ms: i64) -> String {
    Query::select()
        .column(Sessions::Id)
        .from(Sessions::Table)
        .and_where(Expr::col(Sessions::StartTime).lt(cutoff_ms))
        .order_by(Sessions::StartTime, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM sessions WHERE id = ?
pub fn delete_by_id(id: &str) -> String {
    Query::delete()
        .from_table(Sessions::Table)
        .and_where(Expr::col(Sessions::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT MIN(start_time) FROM sessions
pub fn select_oldest_start() -> String {
    Query::select()
        .expr(Func::min(Expr::col(Sessions::StartTime)))
        .from(Sessions::Table)
        .to_string(SqliteQueryBuilder)
}
