// Library interface for the recorder binary and the integration tests

pub mod capture;
pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod export;
pub mod queries;
pub mod recorder;
pub mod scheduler;
pub mod schema;
pub mod sensors;
pub mod serve;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
pub use error::{RecorderError, Result};
pub use recorder::{Recorder, RecorderEvent, RecorderSettings};
pub use store::SegmentStore;
