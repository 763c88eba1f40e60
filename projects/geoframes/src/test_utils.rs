//! Shared fakes for pipeline tests.
//!
//! Scripted stand-ins for the external metadata tool and frame decoder, plus
//! an observer that records events as short strings.

use crate::pipeline::events::{PipelineEvent, PipelineObserver};
use crate::pipeline::split::frame_filename;
use crate::pipeline::types::FramePoint;
use crate::tools::{FrameDecoder, GeotagFields, MetadataTool, TagMap, ToolError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn failed(stderr: &str) -> ToolError {
    ToolError::Failed {
        program: "fake".to_string(),
        status: Some(1),
        stderr: stderr.to_string(),
    }
}

/// Tag map for a video with one GPS document per `(offset, latitude)` pair.
///
/// Longitude is fixed at 20°E and altitude at 100 m.
pub fn gps_tags(duration: &str, samples: &[(i64, f64)]) -> TagMap {
    let start = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
    let mut tags = TagMap::new();
    tags.insert("SourceFile".into(), json!("ride.mp4"));
    tags.insert("Main:Duration".into(), json!(duration));
    tags.insert("Main:Make".into(), json!("GoPro"));
    tags.insert("Main:Model".into(), json!("Max"));
    tags.insert("Main:ImageWidth".into(), json!(5376));
    tags.insert("Main:ImageHeight".into(), json!(2688));
    tags.insert("Main:ProjectionType".into(), json!("equirectangular"));

    for (i, (offset, latitude)) in samples.iter().enumerate() {
        let doc = format!("Doc{}", i + 1);
        let time = start + Duration::seconds(*offset);
        tags.insert(format!("{doc}:SampleTime"), json!(format!("{offset} s")));
        tags.insert(
            format!("{doc}:GPSDateTime"),
            json!(time.format("%Y:%m:%d %H:%M:%SZ").to_string()),
        );
        tags.insert(format!("{doc}:GPSLatitude"), json!(latitude));
        tags.insert(
            format!("{doc}:GPSLongitude"),
            json!("20 deg 0' 0.00\" E"),
        );
        tags.insert(format!("{doc}:GPSAltitude"), json!("100 m"));
    }
    tags
}

/// A frame at `offset` seconds past a fixed start time.
pub fn frame_at(offset: usize, latitude: f64, longitude: f64, altitude: f64) -> FramePoint {
    let start = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
    FramePoint {
        capture_time: start + Duration::seconds(offset as i64),
        latitude,
        longitude,
        altitude,
        image_filename: frame_filename(offset),
        camera_model: Some("Max".to_string()),
        camera_make: Some("GoPro".to_string()),
        width: Some(5376),
        height: Some(2688),
        is_equirectangular: true,
        frame_index: offset,
    }
}

/// `count` frames heading north from (10, 20), one second apart.
pub fn frame_points(count: usize, start: DateTime<Utc>) -> Vec<FramePoint> {
    (0..count)
        .map(|i| FramePoint {
            capture_time: start + Duration::seconds(i as i64),
            ..frame_at(i, 10.0 + i as f64 * 0.0001, 20.0, 100.0)
        })
        .collect()
}

/// Scripted metadata tool.
#[derive(Default)]
pub struct FakeMetadataTool {
    tags: Option<TagMap>,
    fail_on: Option<String>,
    timeout_once_on: Mutex<Option<String>>,
    reversed_completion: bool,
    reads: AtomicUsize,
    writes: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeMetadataTool {
    pub fn with_tags(tags: TagMap) -> Self {
        Self {
            tags: Some(tags),
            ..Self::default()
        }
    }

    /// Every read fails as if the file could not be opened.
    pub fn unreadable() -> Self {
        Self::default()
    }

    /// Writes to a file with this name fail permanently.
    pub fn failing_on(mut self, filename: &str) -> Self {
        self.fail_on = Some(filename.to_string());
        self
    }

    /// The first write to a file with this name times out.
    pub fn timing_out_once_on(self, filename: &str) -> Self {
        *self.timeout_once_on.lock().unwrap() = Some(filename.to_string());
        self
    }

    /// Later frames finish writing before earlier ones.
    pub fn with_reversed_completion(mut self) -> Self {
        self.reversed_completion = true;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Every write attempt, in the order they started.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl MetadataTool for FakeMetadataTool {
    async fn read_tags(&self, _video: &Path) -> Result<TagMap, ToolError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.tags
            .clone()
            .ok_or_else(|| failed("Error: File not found"))
    }

    async fn write_tags(&self, image: &Path, _fields: &GeotagFields) -> Result<(), ToolError> {
        self.writes.lock().unwrap().push(image.to_path_buf());
        let name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = if self.reversed_completion {
            let n = crate::pipeline::split::frame_number(&name).unwrap_or(0) as u64;
            std::time::Duration::from_millis(40u64.saturating_sub(n * 4))
        } else {
            std::time::Duration::from_millis(1)
        };
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut timeout_once = self.timeout_once_on.lock().unwrap();
            if timeout_once.as_deref() == Some(name.as_str()) {
                *timeout_once = None;
                return Err(ToolError::Timeout {
                    program: "fake".to_string(),
                    secs: 1,
                });
            }
        }
        if self.fail_on.as_deref() == Some(name.as_str()) {
            return Err(failed("Error: Not a valid JPG"));
        }
        Ok(())
    }
}

enum DecoderMode {
    /// Produce exactly the requested number of frames.
    Complete,
    /// Produce a fixed number of frames regardless of the request.
    Fixed(usize),
    Fail,
}

/// Scripted frame decoder that writes empty `_<n>.jpg` files.
pub struct FakeDecoder {
    mode: DecoderMode,
    calls: AtomicUsize,
    requested: Mutex<Option<usize>>,
}

impl FakeDecoder {
    fn new(mode: DecoderMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            requested: Mutex::new(None),
        }
    }

    pub fn complete() -> Self {
        Self::new(DecoderMode::Complete)
    }

    pub fn producing(frames: usize) -> Self {
        Self::new(DecoderMode::Fixed(frames))
    }

    pub fn failing() -> Self {
        Self::new(DecoderMode::Fail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Option<usize> {
        *self.requested.lock().unwrap()
    }
}

impl FrameDecoder for FakeDecoder {
    async fn decode_frames(
        &self,
        _input: &Path,
        frame_count: usize,
        output_dir: &Path,
    ) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.requested.lock().unwrap() = Some(frame_count);

        let produced = match self.mode {
            DecoderMode::Complete => frame_count,
            DecoderMode::Fixed(n) => n,
            DecoderMode::Fail => return Err(failed("Invalid data found when processing input")),
        };
        for offset in 0..produced {
            std::fs::write(output_dir.join(frame_filename(offset)), b"")
                .map_err(|e| failed(&e.to_string()))?;
        }
        Ok(())
    }
}

/// Records every event as a short, assertion-friendly string.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let line = match event {
            PipelineEvent::StageStarted(stage) => format!("started {stage}"),
            PipelineEvent::StageCompleted { stage, items } => {
                format!("completed {stage} {items}")
            }
            PipelineEvent::SampleSkipped { document, error } => {
                format!("skipped {document}: {error}")
            }
            PipelineEvent::DuplicateSample { document, offset } => {
                format!("duplicate {document} at {offset}")
            }
            PipelineEvent::FrameTagged { frame, .. } => {
                format!("tagged {}", frame.image_filename)
            }
            PipelineEvent::Failed(error) => format!("failed {}: {error}", error.stage()),
            PipelineEvent::Completed(summary) => format!("done {}", summary.entries.len()),
        };
        self.events.lock().unwrap().push(line);
    }
}
