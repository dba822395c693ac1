use thiserror::Error;

/// Errors raised by the capture engine, the store, and the device adapters
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Camera or location access was refused; the session is never created
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The capture device failed while a segment was being recorded
    #[error("Capture device error: {0}")]
    Device(String),

    #[error("Location fix unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Store used before its schema was initialized")]
    StoreNotInitialized,

    #[error("Unsupported database version: '{found}', expected '{expected}'")]
    SchemaVersion { found: String, expected: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("No recording is active")]
    NotActive,

    #[error("A recording is already active (session {0})")]
    AlreadyActive(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl RecorderError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether a failure during rotation ends the session immediately.
    /// Other failures only end it once they repeat on consecutive rotations.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::StoreNotInitialized | Self::SchemaVersion { .. }
        )
    }
}

pub type Result<T, E = RecorderError> = std::result::Result<T, E>;
