// Tag writer: persists each frame's computed geotag into the frame file

use crate::error::PipelineError;
use crate::pipeline::events::{PipelineEvent, PipelineObserver};
use crate::pipeline::types::{ContainerAttributes, FramePoint};
use crate::tools::{retry, GeotagFields, MetadataTool, RetryPolicy};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TaggedFrames {
    /// Ordered by frame index.
    pub frames: Vec<FramePoint>,
    pub start_time: DateTime<Utc>,
}

/// Field map for one frame; projection and make are shared by every frame.
pub fn geotag_fields(frame: &FramePoint, attributes: &ContainerAttributes) -> GeotagFields {
    let t = frame.capture_time;
    GeotagFields {
        all_dates: t.format("%Y-%m-%dT%H:%M:%S").to_string(),
        gps_time_stamp: t.format("%H:%M:%S").to_string(),
        gps_date_stamp: t.format("%Y-%m-%d").to_string(),
        latitude: frame.latitude,
        longitude: frame.longitude,
        altitude: frame.altitude,
        projection_type: attributes.projection_type(),
        make: attributes.camera_make(),
    }
}

async fn write_frame<T: MetadataTool>(
    tool: &T,
    path: PathBuf,
    frame: FramePoint,
    fields: GeotagFields,
    retry_policy: &RetryPolicy,
) -> Result<FramePoint, PipelineError> {
    match retry(retry_policy, "tag write", || tool.write_tags(&path, &fields)).await {
        Ok(()) => Ok(frame),
        Err(e) => Err(PipelineError::metadata_write(path, e)),
    }
}

/// Writes every frame's geotag with at most `concurrency` writes in flight.
///
/// Succeeds only if every write succeeds. After the first failure no new
/// writes are started; the ones already running are drained and the first
/// error is returned.
#[allow(clippy::too_many_arguments)]
pub async fn write_tags<T: MetadataTool>(
    tool: &T,
    output_dir: &Path,
    frames: Vec<FramePoint>,
    attributes: &ContainerAttributes,
    start_time: DateTime<Utc>,
    concurrency: usize,
    retry_policy: &RetryPolicy,
    observer: &dyn PipelineObserver,
) -> Result<TaggedFrames, PipelineError> {
    let total = frames.len();
    let concurrency = concurrency.max(1);
    let mut queue = frames.into_iter();
    let mut in_flight = FuturesUnordered::new();
    let mut written: Vec<FramePoint> = Vec::with_capacity(total);
    let mut first_error = None;
    let mut failures = 0;

    loop {
        while first_error.is_none() && in_flight.len() < concurrency {
            let Some(frame) = queue.next() else { break };
            let path = output_dir.join(&frame.image_filename);
            let fields = geotag_fields(&frame, attributes);
            in_flight.push(write_frame(tool, path, frame, fields, retry_policy));
        }

        let Some(result) = in_flight.next().await else {
            break;
        };

        match result {
            Ok(frame) => {
                observer.on_event(&PipelineEvent::FrameTagged {
                    frame: &frame,
                    completed: written.len() + 1,
                    total,
                });
                written.push(frame);
            }
            Err(e) => {
                failures += 1;
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        tracing::error!(
            "{} tag write(s) failed, {} of {} frames written before stopping",
            failures,
            written.len(),
            total
        );
        return Err(e);
    }

    written.sort_by_key(|f| f.frame_index);
    Ok(TaggedFrames {
        frames: written,
        start_time,
    })
}
