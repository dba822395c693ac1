//! SQL builders, one module per table. Every function returns a
//! ready-to-run SQLite statement.

pub mod ddl;
pub mod metadata;
pub mod metrics;
pub mod segments;
pub mod sessions;
pub mod video_chunks;
