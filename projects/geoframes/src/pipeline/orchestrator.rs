// Pipeline orchestrator: manages the lifecycle of one geotagging run
//
// Extracting -> Splitting -> Tagging -> Done, with Failed reachable from every
// active stage. Each stage consumes the previous stage's typed result; the
// first error short-circuits the rest and is routed to the observer.

use crate::error::PipelineError;
use crate::pipeline::events::{PipelineEvent, PipelineObserver};
use crate::pipeline::extract::{extract_metadata, parse_duration, Extraction, Hemisphere};
use crate::pipeline::geodesy::{build_sequence, BearingFormula};
use crate::pipeline::interpolate::{interpolate_frames, resolve_start_time};
use crate::pipeline::split::{ensure_dense, split_frames, target_frame_count};
use crate::pipeline::tagging::{write_tags, TaggedFrames};
pub use crate::pipeline::types::ProcessingState;
use crate::pipeline::types::{PipelineStage, KEY_DURATION};
use crate::run_artifacts::SequenceSummary;
use crate::tools::{FrameDecoder, MetadataTool, RetryPolicy};
use std::path::Path;

/// Tunables for a single run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Maximum concurrent tag writes.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub hemisphere: Hemisphere,
    pub bearing: BearingFormula,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            retry: RetryPolicy::none(),
            hemisphere: Hemisphere::default(),
            bearing: BearingFormula::default(),
        }
    }
}

/// Collaborators and shared state of a run.
pub struct Pipeline<'a, M, D> {
    pub metadata_tool: &'a M,
    pub decoder: &'a D,
    pub config: PipelineConfig,
    pub state: &'a ProcessingState,
    pub observer: &'a dyn PipelineObserver,
}

impl<'a, M: MetadataTool, D: FrameDecoder> Pipeline<'a, M, D> {
    /// Runs every stage against `video`, writing frames into `output_dir`.
    ///
    /// Failures are reported to the observer exactly once and returned.
    pub async fn run(
        &self,
        video: &Path,
        output_dir: &Path,
    ) -> Result<SequenceSummary, PipelineError> {
        tracing::info!(
            "Starting run {} for {} -> {}",
            self.state.run_id,
            video.display(),
            output_dir.display()
        );

        match self.run_stages(video, output_dir).await {
            Ok(summary) => {
                self.state.transition(PipelineStage::Done);
                self.observer.on_event(&PipelineEvent::Completed(&summary));
                Ok(summary)
            }
            Err(e) => {
                self.state.fail(e.to_string());
                self.observer.on_event(&PipelineEvent::Failed(&e));
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        video: &Path,
        output_dir: &Path,
    ) -> Result<SequenceSummary, PipelineError> {
        let extraction = self.extract(video).await?;

        let duration = extraction
            .attributes
            .get(KEY_DURATION)
            .and_then(parse_duration)
            .ok_or_else(|| PipelineError::MetadataInvalid {
                path: video.to_path_buf(),
                reason: format!("missing or unreadable {}", KEY_DURATION),
            })?;
        if extraction.samples.is_empty() {
            return Err(PipelineError::MetadataInvalid {
                path: video.to_path_buf(),
                reason: "no GPS samples found".to_string(),
            });
        }
        let start_time = resolve_start_time(&extraction.attributes, &extraction.samples)
            .ok_or_else(|| PipelineError::MetadataInvalid {
                path: video.to_path_buf(),
                reason: "no usable start time".to_string(),
            })?;
        let whole_seconds = duration.ceil() as usize;

        self.advance(PipelineStage::Splitting)?;
        let frame_count = target_frame_count(duration);
        let frames = split_frames(self.decoder, video, frame_count, output_dir).await?;
        ensure_dense(&frames, whole_seconds, video)?;
        self.state
            .update_stage(PipelineStage::Splitting, frames.len(), frame_count);
        self.completed(PipelineStage::Splitting, frames.len());

        self.advance(PipelineStage::Tagging)?;
        let tagged = self
            .tag(output_dir, &extraction, whole_seconds, start_time)
            .await?;

        Ok(build_sequence(
            tagged.frames,
            tagged.start_time,
            self.config.bearing,
        ))
    }

    async fn extract(&self, video: &Path) -> Result<Extraction, PipelineError> {
        self.ensure_not_cancelled(PipelineStage::Extracting)?;
        self.observer
            .on_event(&PipelineEvent::StageStarted(PipelineStage::Extracting));

        let extraction = extract_metadata(
            self.metadata_tool,
            video,
            &self.config.retry,
            self.config.hemisphere,
            self.observer,
        )
        .await?;

        let count = extraction.samples.len();
        self.state
            .update_stage(PipelineStage::Extracting, count, count);
        self.completed(PipelineStage::Extracting, count);
        Ok(extraction)
    }

    async fn tag(
        &self,
        output_dir: &Path,
        extraction: &Extraction,
        whole_seconds: usize,
        start_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<TaggedFrames, PipelineError> {
        let points = interpolate_frames(
            &extraction.samples,
            &extraction.attributes,
            whole_seconds,
            start_time,
        );
        let total = points.len();

        let tagged = write_tags(
            self.metadata_tool,
            output_dir,
            points,
            &extraction.attributes,
            start_time,
            self.config.concurrency,
            &self.config.retry,
            self.observer,
        )
        .await?;

        self.state
            .update_stage(PipelineStage::Tagging, tagged.frames.len(), total);
        self.completed(PipelineStage::Tagging, tagged.frames.len());
        Ok(tagged)
    }

    fn advance(&self, next: PipelineStage) -> Result<(), PipelineError> {
        self.ensure_not_cancelled(next)?;
        self.state.transition(next);
        self.observer.on_event(&PipelineEvent::StageStarted(next));
        Ok(())
    }

    fn completed(&self, stage: PipelineStage, items: usize) {
        self.observer
            .on_event(&PipelineEvent::StageCompleted { stage, items });
    }

    fn ensure_not_cancelled(&self, stage: PipelineStage) -> Result<(), PipelineError> {
        if self.state.cancel_signal().is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }
}
