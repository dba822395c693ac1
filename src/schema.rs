use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Sessions table - one row per recording session
#[derive(Iden)]
pub enum Sessions {
    Table,
    Id,
    StartTime,
    EndTime,
    Status,
    /// JSON-encoded route (start/end location and path points)
    Route,
}

/// Segments table - committed slices of a session
#[derive(Iden)]
pub enum Segments {
    Table,
    Id,
    SessionId,
    VideoChunkId,
    StartTime,
    EndTime,
    /// JSON-encoded telemetry arrays
    SensorData,
}

/// Video chunks table - one media payload per segment
#[derive(Iden)]
pub enum VideoChunks {
    Table,
    Id,
    Blob,
    StartTime,
    Duration,
}

/// Metrics table - holds the storage metrics singleton
#[derive(Iden)]
pub enum Metrics {
    Table,
    Key,
    UsedSpace,
    AvailableSpace,
    OldestSession,
    ActiveSegments,
}
