//! Capture through an external encoder process.
//!
//! Each segment runs the configured program once (typically ffmpeg writing
//! WebM to stdout); stdout is collected as media fragments until the process
//! is stopped. Placeholders `{device}`, `{facing_mode}`, `{width}` and
//! `{height}` in the arguments are filled from the constraints.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::{CaptureConstraints, CaptureDevice, CaptureHandle};
use crate::error::{RecorderError, Result};

const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    device: Option<PathBuf>,
}

impl CommandCapture {
    pub fn new(program: impl Into<String>, args: Vec<String>, device: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            device,
        }
    }

    fn expand_args(&self, constraints: &CaptureConstraints) -> Vec<String> {
        let device = self
            .device
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{device}", &device)
                    .replace("{facing_mode}", constraints.facing_mode.as_str())
                    .replace("{width}", &constraints.width.to_string())
                    .replace("{height}", &constraints.height.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl CaptureDevice for CommandCapture {
    async fn acquire(&self, constraints: CaptureConstraints) -> Result<Box<dyn CaptureHandle>> {
        if let Some(device) = &self.device {
            tokio::fs::File::open(device).await.map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => RecorderError::PermissionDenied(format!(
                    "Cannot open capture device '{}': {}",
                    device.display(),
                    e
                )),
                _ => RecorderError::Device(format!(
                    "Cannot open capture device '{}': {}",
                    device.display(),
                    e
                )),
            })?;
        }

        let args = self.expand_args(&constraints);
        info!(
            "Capture device acquired: {} {} ({}x{}, {})",
            self.program,
            args.join(" "),
            constraints.width,
            constraints.height,
            constraints.facing_mode.as_str()
        );
        Ok(Box::new(CommandHandle {
            program: self.program.clone(),
            args,
            running: None,
        }))
    }
}

struct Running {
    child: Child,
    reader: JoinHandle<std::io::Result<Vec<Bytes>>>,
}

struct CommandHandle {
    program: String,
    args: Vec<String>,
    running: Option<Running>,
}

async fn collect_fragments(mut stdout: ChildStdout) -> std::io::Result<Vec<Bytes>> {
    let mut fragments = Vec::new();
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        if stdout.read_buf(&mut buf).await? == 0 {
            break;
        }
        fragments.push(buf.split().freeze());
        buf.reserve(READ_CHUNK_SIZE);
    }
    Ok(fragments)
}

#[async_trait]
impl CaptureHandle for CommandHandle {
    async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(RecorderError::Device("capture already running".to_string()));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::PermissionDenied => RecorderError::PermissionDenied(format!(
                    "Cannot run capture program '{}': {}",
                    self.program, e
                )),
                _ => RecorderError::Device(format!(
                    "Failed to start capture program '{}': {}",
                    self.program, e
                )),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecorderError::Device("capture stdout unavailable".to_string()))?;
        let reader = tokio::spawn(collect_fragments(stdout));

        debug!("Capture process started (pid {:?})", child.id());
        self.running = Some(Running { child, reader });
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<Bytes>> {
        let Running { mut child, reader } = self
            .running
            .take()
            .ok_or_else(|| RecorderError::Device("capture not running".to_string()))?;

        // An encoder that already exited on its own failed mid-segment
        let early_exit = child.try_wait()?;
        if early_exit.is_none() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to signal capture process: {}", e);
            }
        }
        child.wait().await?;

        let fragments = reader
            .await
            .map_err(|e| RecorderError::Device(format!("capture reader failed: {}", e)))?
            .map_err(|e| RecorderError::Device(format!("capture read error: {}", e)))?;

        match early_exit {
            Some(status) if !status.success() && fragments.is_empty() => Err(
                RecorderError::Device(format!("capture process exited with {}", status)),
            ),
            Some(status) if !status.success() => {
                warn!(
                    "Capture process exited with {}; keeping {} partial fragments",
                    status,
                    fragments.len()
                );
                Ok(fragments)
            }
            _ => Ok(fragments),
        }
    }

    async fn release(&mut self) -> Result<()> {
        if self.running.is_some() {
            self.stop().await?;
        }
        debug!("Capture device released");
        Ok(())
    }
}
