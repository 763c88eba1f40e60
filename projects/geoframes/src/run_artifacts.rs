// Run artifact struct definitions
//
// Records persisted as JSON / CSV files within a run's output directory.

use crate::pipeline::types::FramePoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A frame linked to its successor in the sequence.
#[derive(Serialize, Debug, Clone)]
pub struct SequenceEntry {
    #[serde(flatten)]
    pub point: FramePoint,
    pub distance_m: f64,
    pub bearing_deg: f64,
    /// Altitude change per meter travelled (unitless).
    pub pitch: f64,
}

/// Ordered frames of one run, ready for route rendering or upload.
#[derive(Serialize, Debug, Clone)]
pub struct SequenceSummary {
    pub start_time: DateTime<Utc>,
    pub total_km: f64,
    pub entries: Vec<SequenceEntry>,
}

/// One row of points.csv
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PointRow {
    pub image: String,
    pub captured_at: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub distance_m: f64,
    pub bearing_deg: f64,
    pub pitch: f64,
}

impl From<&SequenceEntry> for PointRow {
    fn from(entry: &SequenceEntry) -> Self {
        Self {
            image: entry.point.image_filename.clone(),
            captured_at: entry.point.capture_time.to_rfc3339(),
            latitude: entry.point.latitude,
            longitude: entry.point.longitude,
            altitude: entry.point.altitude,
            distance_m: entry.distance_m,
            bearing_deg: entry.bearing_deg,
            pitch: entry.pitch,
        }
    }
}

/// Description of the run written to metadata.json
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunMetadata {
    pub source_video: String,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
    pub frame_count: usize,
    pub start_time: DateTime<Utc>,
    pub total_km: f64,
}
