use fs2::FileExt;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::constants::EXPECTED_DB_VERSION;
use crate::error::{RecorderError, Result};
use crate::queries::{ddl, metadata};

/// Open a file-based database pool for production use
/// Enables WAL mode and foreign keys, creating the file if needed
pub async fn open_database_connection(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("SQLite database: {}", db_path.display());
    Ok(pool)
}

/// Create a database in a fresh temporary directory for testing
/// Returns the pool and the directory guard; keep the guard alive for the
/// lifetime of the pool
pub async fn create_test_connection_in_temporary_file() -> Result<(SqlitePool, tempfile::TempDir)> {
    let temp_dir = tempfile::tempdir()?;
    let pool = open_database_connection(&temp_dir.path().join("test.sqlite")).await?;
    Ok((pool, temp_dir))
}

/// Create tables and indexes, then record or verify the schema version
pub async fn init_database_schema(pool: &SqlitePool) -> Result<()> {
    for sql in [
        ddl::create_metadata_table(),
        ddl::create_sessions_table(),
        ddl::create_segments_table(),
        ddl::create_video_chunks_table(),
        ddl::create_metrics_table(),
        ddl::create_sessions_start_time_index(),
        ddl::create_segments_session_id_index(),
    ] {
        sqlx::query(&sql).execute(pool).await?;
    }

    sqlx::query(&metadata::insert_or_ignore("version", EXPECTED_DB_VERSION))
        .execute(pool)
        .await?;

    let version: String = sqlx::query(&metadata::select_by_key("version"))
        .fetch_one(pool)
        .await?
        .try_get(0)?;

    if version != EXPECTED_DB_VERSION {
        return Err(RecorderError::SchemaVersion {
            found: version,
            expected: EXPECTED_DB_VERSION.to_string(),
        });
    }

    Ok(())
}

/// Path of the lock file guarding a database against concurrent recorders
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Acquire the exclusive recorder lock for a database
/// The lock is held until the returned file is dropped
pub fn lock_database(db_path: &Path) -> Result<File> {
    let lock_path = lock_path_for(db_path);
    if let Some(parent) = lock_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let lock_file = File::create(&lock_path)?;
    lock_file.try_lock_exclusive().map_err(|_| {
        RecorderError::Config(format!(
            "Another recorder is already using '{}'. Lock file: {}",
            db_path.display(),
            lock_path.display()
        ))
    })?;
    Ok(lock_file)
}
