use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};

use crate::constants::STORAGE_METRICS_KEY;
use crate::schema::Metrics;
use crate::types::StorageMetrics;

/// INSERT INTO metrics (key, used_space, available_space, oldest_session, active_segments)
/// VALUES ('storage', ?, ?, ?, ?) ON CONFLICT (key) DO UPDATE SET ...
pub fn upsert(metrics: &StorageMetrics) -> String {
    Query::insert()
        .into_table(Metrics::Table)
        .columns([
            Metrics::Key,
            Metrics::UsedSpace,
            Metrics::AvailableSpace,
            Metrics::OldestSession,
            Metrics::ActiveSegments,
        ])
        .values_panic([
            STORAGE_METRICS_KEY.into(),
            metrics.used_space.into(),
            metrics.available_space.into(),
            metrics.oldest_session.into(),
            metrics.active_segments.into(),
        ])
        .on_conflict(
            OnConflict::column(Metrics::Key)
                .update_columns([
                    Metrics::UsedSpace,
                    Metrics::AvailableSpace,
                    Metrics::OldestSession,
                    Metrics::ActiveSegments,
                ])
                .to_owned(),
        )
        .to_string(SqliteQueryBuilder)
}

/// SELECT used_space, available_space, oldest_session, active_segments FROM metrics WHERE key = 'storage'
pub fn select() -> String {
    Query::select()
        .columns([
            Metrics::UsedSpace,
            Metrics::AvailableSpace,
            Metrics::OldestSession,
            Metrics::ActiveSegments,
        ])
        .from(Metrics::Table)
        .and_where(Expr::col(Metrics::Key).eq(STORAGE_METRICS_KEY))
        .to_string(SqliteQueryBuilder)
}
