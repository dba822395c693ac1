use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use drive_recorder::capture::CommandCapture;
use drive_recorder::clock::{Clock, SystemClock};
use drive_recorder::config::RecorderConfig;
use drive_recorder::db::lock_database;
use drive_recorder::export::{format_duration, write_session_export};
use drive_recorder::recorder::{Recorder, RecorderEvent};
use drive_recorder::sensors::{FeedSensors, LocationSource, MotionSource};
use drive_recorder::serve::serve_sessions;
use drive_recorder::store::SegmentStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Record segmented driving sessions with video and telemetry")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a driving session until Ctrl-C
    Record {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// List recorded sessions
    Sessions {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Export a session as JSON plus one WebM file per segment
    Export {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Session to export
        session_id: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Delete sessions older than the retention period
    Evict {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Retention in hours (overrides config file)
        #[arg(long)]
        retention_hours: Option<i64>,
    },
    /// Show storage metrics
    Metrics {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Recompute before printing
        #[arg(long)]
        refresh: bool,
    },
    /// Serve recorded sessions over a read-only HTTP API
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match args.command {
        Command::Record { config, duration } => record(&config, duration).await,
        Command::Sessions { config } => list_sessions(&config).await,
        Command::Export {
            config,
            session_id,
            output,
        } => export(&config, &session_id, &output).await,
        Command::Evict {
            config,
            retention_hours,
        } => evict(&config, retention_hours).await,
        Command::Metrics { config, refresh } => metrics(&config, refresh).await,
        Command::Serve { config, port } => serve(&config, port).await,
    }
}

async fn open_store(config: &RecorderConfig) -> Result<Arc<SegmentStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SegmentStore::open(&config.database).await?))
}

async fn record(config_path: &Path, duration: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let config = RecorderConfig::load(config_path)?;

    // Held until the process exits
    let _lock = lock_database(&config.database)?;
    let store = open_store(&config).await?;

    let report = store.evict_older_than(config.retention_ms()).await?;
    if report.sessions > 0 {
        store.refresh_storage_metrics().await?;
    }

    let sensors = Arc::new(FeedSensors::open(&config.sensors.feed).await?);
    let capture = Arc::new(CommandCapture::new(
        config.capture.program.clone(),
        config.capture.args.clone(),
        config.capture.device.clone(),
    ));
    let recorder = Recorder::new(
        Arc::clone(&store),
        capture,
        Arc::clone(&sensors) as Arc<dyn MotionSource>,
        sensors as Arc<dyn LocationSource>,
        Arc::new(SystemClock),
        config.recorder_settings(),
    );

    let mut events = recorder.subscribe_events();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RecorderEvent::SegmentCommitted {
                    artifact_name,
                    bytes,
                    duration_ms,
                    ..
                } => info!(
                    "Segment ready: {} ({} bytes, {} ms)",
                    artifact_name, bytes, duration_ms
                ),
                RecorderEvent::DeviceError { segment_id, message } => {
                    warn!("Segment {} has no video: {}", segment_id, message)
                }
                _ => {}
            }
        }
    });

    let session_id = recorder.start().await?;
    println!("Recording session {}", session_id);
    match duration {
        Some(secs) => {
            println!("Recording for {} seconds (Ctrl-C to stop early)", secs);
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => {
            println!("Press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    let stopped = recorder.stop().await;
    event_log.abort();
    if let Err(e) = store.refresh_storage_metrics().await {
        warn!("Failed to refresh storage metrics: {}", e);
    }
    let session = stopped?;

    let end = session.end_time.unwrap_or(session.start_time);
    println!(
        "Session {} {}: {} segments, {}",
        session.id,
        session.status,
        session.segments.len(),
        format_duration(end - session.start_time)
    );
    Ok(())
}

async fn list_sessions(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = RecorderConfig::load(config_path)?;
    let store = open_store(&config).await?;
    let now = SystemClock.now_ms();

    let sessions = store.get_all_sessions().await?;
    if sessions.is_empty() {
        println!("No sessions recorded");
        return Ok(());
    }
    for session in sessions {
        let start = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(session.start_time)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        let end = session.end_time.unwrap_or(now);
        println!(
            "{}  {}  {:<9}  {:>3} segments  {}",
            session.id,
            start,
            session.status.as_str(),
            session.segments.len(),
            format_duration(end - session.start_time)
        );
    }
    Ok(())
}

async fn export(
    config_path: &Path,
    session_id: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = RecorderConfig::load(config_path)?;
    let store = open_store(&config).await?;
    let path = write_session_export(&store, session_id, output, SystemClock.now_ms()).await?;
    println!("Exported to {}", path.display());
    Ok(())
}

async fn evict(config_path: &Path, retention_hours: Option<i64>) -> Result<(), Box<dyn std::error::Error>> {
    let config = RecorderConfig::load(config_path)?;
    let retention_ms = match retention_hours {
        Some(hours) if hours <= 0 => return Err("retention_hours must be greater than 0".into()),
        Some(hours) => hours * 3_600_000,
        None => config.retention_ms(),
    };

    let store = open_store(&config).await?;
    let report = store.evict_older_than(retention_ms).await?;
    store.refresh_storage_metrics().await?;
    println!(
        "Evicted {} sessions ({} segments, {} video chunks)",
        report.sessions, report.segments, report.video_chunks
    );
    Ok(())
}

async fn metrics(config_path: &Path, refresh: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = RecorderConfig::load(config_path)?;
    let store = open_store(&config).await?;

    let metrics = if refresh {
        Some(store.refresh_storage_metrics().await?)
    } else {
        store.get_storage_metrics().await?
    };
    match metrics {
        Some(metrics) => println!("{}", serde_json::to_string_pretty(&metrics)?),
        None => println!("No metrics recorded yet (run with --refresh)"),
    }
    Ok(())
}

async fn serve(config_path: &Path, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let config = RecorderConfig::load(config_path)?;
    let store = open_store(&config).await?;
    serve_sessions(store, Arc::new(SystemClock), port.unwrap_or(config.serve.port)).await
}
