use crate::tools::CancelSignal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::watch;

/// Shared container key holding the recorded GPS start time.
pub const KEY_GPS_DATE_TIME: &str = "Main:GPSDateTime";
pub const KEY_DURATION: &str = "Main:Duration";
pub const KEY_MODEL: &str = "Main:Model";
pub const KEY_MAKE: &str = "Main:Make";
pub const KEY_IMAGE_WIDTH: &str = "Main:ImageWidth";
pub const KEY_IMAGE_HEIGHT: &str = "Main:ImageHeight";
pub const KEY_PROJECTION_TYPE: &str = "Main:ProjectionType";

pub const EQUIRECTANGULAR: &str = "equirectangular";

/// A single GPS reading from one embedded metadata document.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsSample {
    pub capture_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Whole seconds from the start of the video.
    pub sample_offset: i64,
}

/// Read-only, container-level attributes of the source video.
///
/// Holds every key of the metadata read that is not part of a per-sample document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerAttributes {
    tags: BTreeMap<String, serde_json::Value>,
}

impl ContainerAttributes {
    pub fn new(tags: BTreeMap<String, serde_json::Value>) -> Self {
        Self { tags }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.tags.get(key)
    }

    /// String view of a tag; numbers are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.tags.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer view of a tag; accepts numbers and numeric strings.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.tags.get(key)? {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn camera_model(&self) -> Option<String> {
        self.text(KEY_MODEL)
    }

    pub fn camera_make(&self) -> Option<String> {
        self.text(KEY_MAKE)
    }

    pub fn projection_type(&self) -> Option<String> {
        self.text(KEY_PROJECTION_TYPE)
    }

    pub fn is_equirectangular(&self) -> bool {
        self.projection_type().as_deref() == Some(EQUIRECTANGULAR)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// One output frame with its computed position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FramePoint {
    pub capture_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub image_filename: String,
    pub camera_model: Option<String>,
    pub camera_make: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub is_equirectangular: bool,
    /// Zero-based second offset of the frame.
    pub frame_index: usize,
}

/// Pipeline state machine. `Failed` is reachable from every other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extracting,
    Splitting,
    Tagging,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Splitting => "splitting",
            Self::Tagging => "tagging",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Forward-only transitions plus `Failed` from anywhere but `Done`.
    pub fn can_transition_to(&self, next: PipelineStage) -> bool {
        matches!(
            (self, next),
            (Self::Extracting, Self::Splitting)
                | (Self::Splitting, Self::Tagging)
                | (Self::Tagging, Self::Done)
                | (Self::Extracting | Self::Splitting | Self::Tagging, Self::Failed)
        )
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct StageProgress {
    pub current: usize,
    pub total: usize,
}

/// Run state shared between the orchestrator, observers and the signal handler.
#[derive(Debug)]
pub struct ProcessingState {
    pub run_id: String,
    stage: RwLock<PipelineStage>,
    pub is_active: AtomicBool,
    pub error: RwLock<Option<String>>,
    pub stages: RwLock<BTreeMap<String, StageProgress>>,
    pub start_time: std::time::Instant,
    cancel_tx: watch::Sender<bool>,
}

impl ProcessingState {
    pub fn new(run_id: String) -> Self {
        let stages = [
            PipelineStage::Extracting,
            PipelineStage::Splitting,
            PipelineStage::Tagging,
        ]
        .iter()
        .map(|s| (s.as_str().to_string(), StageProgress::default()))
        .collect();

        let (cancel_tx, _) = watch::channel(false);

        Self {
            run_id,
            stage: RwLock::new(PipelineStage::Extracting),
            is_active: AtomicBool::new(true),
            error: RwLock::new(None),
            stages: RwLock::new(stages),
            start_time: std::time::Instant::now(),
            cancel_tx,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
            .read()
            .map(|s| *s)
            .unwrap_or(PipelineStage::Failed)
    }

    /// Moves to `next` if the state machine allows it. Returns whether it moved.
    pub fn transition(&self, next: PipelineStage) -> bool {
        let Ok(mut stage) = self.stage.write() else {
            return false;
        };
        if !stage.can_transition_to(next) {
            tracing::warn!("Ignoring invalid transition {} -> {}", *stage, next);
            return false;
        }
        *stage = next;
        if matches!(next, PipelineStage::Done | PipelineStage::Failed) {
            self.is_active.store(false, Ordering::Relaxed);
        }
        true
    }

    pub fn fail(&self, message: String) {
        if let Ok(mut error) = self.error.write() {
            *error = Some(message);
        }
        self.transition(PipelineStage::Failed);
    }

    pub fn update_stage(&self, stage: PipelineStage, current: usize, total: usize) {
        if let Ok(mut stages) = self.stages.write() {
            if let Some(progress) = stages.get_mut(stage.as_str()) {
                progress.current = current;
                progress.total = total;
            }
        }
    }

    /// Requests cancellation of every in-flight subprocess of this run.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        CancelSignal::new(self.cancel_tx.subscribe())
    }

    pub fn to_progress_json(&self) -> serde_json::Value {
        let stages = self
            .stages
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        let error = self.error.read().ok().and_then(|e| e.clone());

        serde_json::json!({
            "run_id": self.run_id,
            "stage": self.stage(),
            "is_active": self.is_active.load(Ordering::Relaxed),
            "error": error,
            "stages": stages,
            "elapsed_secs": self.start_time.elapsed().as_secs_f64(),
        })
    }
}
