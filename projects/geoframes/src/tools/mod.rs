pub mod exiftool;
pub mod ffmpeg;

use std::future::Future;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;

/// Flat tag map as returned by the metadata tool (`Doc<n>:Key` / `Main:Key`).
pub type TagMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with status {status:?}: {stderr}")]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("unexpected output from {program}: {reason}")]
    Output { program: String, reason: String },

    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Spawn { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Field map written into a single frame's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GeotagFields {
    pub all_dates: String,
    pub gps_time_stamp: String,
    pub gps_date_stamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub projection_type: Option<String>,
    pub make: Option<String>,
}

/// Reads and writes embedded metadata.
pub trait MetadataTool {
    /// Reads every embedded document group of `video` into a flat tag map.
    async fn read_tags(&self, video: &Path) -> Result<TagMap, ToolError>;

    /// Overwrites the metadata of `image` in place.
    async fn write_tags(&self, image: &Path, fields: &GeotagFields) -> Result<(), ToolError>;
}

/// Decodes a video into one still image per second.
pub trait FrameDecoder {
    /// Emits `frame_count` JPEG files named `_<n>.jpg` (1-based) into `output_dir`.
    async fn decode_frames(
        &self,
        input: &Path,
        frame_count: usize,
        output_dir: &Path,
    ) -> Result<(), ToolError>;
}

/// Cooperative cancellation shared by every subprocess of a run.
#[derive(Clone, Debug)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender gone without cancelling: this run can no longer be cancelled.
            std::future::pending::<()>().await;
        }
    }
}

/// Runs a prepared command to completion.
///
/// The child is killed when the returned future is dropped, which covers
/// both timeouts and cancellation.
pub async fn run_tool(
    mut cmd: Command,
    program: &str,
    timeout: Option<Duration>,
    cancel: &CancelSignal,
) -> Result<Output, ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }

    cmd.kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::debug!("Running {:?}", cmd.as_std());

    let child = cmd.spawn().map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let wait = async {
        let waited = match timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ToolError::Timeout {
                    program: program.to_string(),
                    secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };
        waited.map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })
    };

    let output = tokio::select! {
        output = wait => output?,
        _ = cancel.cancelled() => return Err(ToolError::Cancelled),
    };

    if !output.status.success() {
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}

/// Bounded retry for transient subprocess failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

/// Runs `op`, retrying transient failures with exponential backoff.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, ToolError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ToolError>>,
{
    let mut attempt = 0;
    let mut delay = policy.backoff;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < policy.retries => {
                attempt += 1;
                tracing::warn!(
                    "{} failed ({}), retrying in {:?} ({}/{})",
                    what,
                    e,
                    delay,
                    attempt,
                    policy.retries
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            result => return result,
        }
    }
}
