// Temporal interpolator: irregular GPS samples -> one position per second

use crate::pipeline::extract::parse_timestamp;
use crate::pipeline::split::frame_filename;
use crate::pipeline::types::{
    ContainerAttributes, FramePoint, GpsSample, KEY_GPS_DATE_TIME, KEY_IMAGE_HEIGHT,
    KEY_IMAGE_WIDTH,
};
use chrono::{DateTime, Duration, Utc};

/// Recorded GPS start time of the container, else the first sample's time.
pub fn resolve_start_time(
    attributes: &ContainerAttributes,
    samples: &[GpsSample],
) -> Option<DateTime<Utc>> {
    attributes
        .text(KEY_GPS_DATE_TIME)
        .and_then(|s| match parse_timestamp(&s) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!("Ignoring container start time: {}", e);
                None
            }
        })
        .or_else(|| samples.first().map(|s| s.capture_time))
}

/// Position at `offset` seconds as (latitude, longitude, altitude).
///
/// Uses the last pair `(prev, next)` with `prev <= offset < next` in scan order;
/// without one, the last sample's position is reused unchanged.
pub fn position_at(samples: &[GpsSample], offset: i64) -> Option<(f64, f64, f64)> {
    let mut bracket = None;
    for pair in samples.windows(2) {
        if pair[0].sample_offset <= offset && pair[1].sample_offset > offset {
            bracket = Some((&pair[0], &pair[1]));
        }
    }

    match bracket {
        Some((prev, next)) => {
            let fraction = (offset as f64 - prev.sample_offset as f64)
                / (next.sample_offset as f64 - prev.sample_offset as f64);
            let lerp = |a: f64, b: f64| a + (b - a) * fraction;
            Some((
                lerp(prev.latitude, next.latitude),
                lerp(prev.longitude, next.longitude),
                lerp(prev.altitude, next.altitude),
            ))
        }
        None => samples
            .last()
            .map(|last| (last.latitude, last.longitude, last.altitude)),
    }
}

/// One frame point per second offset in `[0, duration_secs)`.
///
/// Returns an empty list when there are no samples to position frames with.
pub fn interpolate_frames(
    samples: &[GpsSample],
    attributes: &ContainerAttributes,
    duration_secs: usize,
    start_time: DateTime<Utc>,
) -> Vec<FramePoint> {
    let camera_model = attributes.camera_model();
    let camera_make = attributes.camera_make();
    let width = attributes.integer(KEY_IMAGE_WIDTH);
    let height = attributes.integer(KEY_IMAGE_HEIGHT);
    let is_equirectangular = attributes.is_equirectangular();

    (0..duration_secs)
        .filter_map(|offset| {
            let (latitude, longitude, altitude) = position_at(samples, offset as i64)?;
            Some(FramePoint {
                capture_time: start_time + Duration::seconds(offset as i64),
                latitude,
                longitude,
                altitude,
                image_filename: frame_filename(offset),
                camera_model: camera_model.clone(),
                camera_make: camera_make.clone(),
                width,
                height,
                is_equirectangular,
                frame_index: offset,
            })
        })
        .collect()
}
