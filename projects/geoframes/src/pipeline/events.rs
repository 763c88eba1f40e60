// Typed pipeline events and the observers that consume them

use crate::error::{PipelineError, SampleParseError};
use crate::pipeline::types::{FramePoint, PipelineStage};
use crate::run_artifacts::SequenceSummary;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug)]
pub enum PipelineEvent<'a> {
    StageStarted(PipelineStage),
    StageCompleted {
        stage: PipelineStage,
        items: usize,
    },
    /// A malformed GPS document was dropped.
    SampleSkipped {
        document: &'a str,
        error: &'a SampleParseError,
    },
    /// A GPS document repeated an already-seen sample offset.
    DuplicateSample {
        document: &'a str,
        offset: i64,
    },
    FrameTagged {
        frame: &'a FramePoint,
        completed: usize,
        total: usize,
    },
    /// Single sink for every pipeline failure.
    Failed(&'a PipelineError),
    Completed(&'a SequenceSummary),
}

/// Receives every event of a run, in the order they occur.
pub trait PipelineObserver {
    fn on_event(&self, event: &PipelineEvent<'_>);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::StageStarted(stage) => tracing::info!("Stage {} started", stage),
            PipelineEvent::StageCompleted { stage, items } => {
                tracing::info!("Stage {} completed ({} items)", stage, items)
            }
            PipelineEvent::SampleSkipped { document, error } => {
                tracing::warn!("Skipping GPS sample {}: {}", document, error)
            }
            PipelineEvent::DuplicateSample { document, offset } => {
                tracing::debug!("Discarding {}: offset {}s already sampled", document, offset)
            }
            PipelineEvent::FrameTagged {
                frame,
                completed,
                total,
            } => tracing::debug!(
                "Tagged {} ({}/{}) at {:.6},{:.6}",
                frame.image_filename,
                completed,
                total,
                frame.latitude,
                frame.longitude
            ),
            PipelineEvent::Failed(error) => {
                tracing::error!(stage = %error.stage(), "Pipeline failed: {}", error)
            }
            PipelineEvent::Completed(summary) => tracing::info!(
                "Sequence ready: {} frames, {:.3} km",
                summary.entries.len(),
                summary.total_km
            ),
        }
    }
}

/// Shows a progress bar while frames are tagged and logs everything else.
pub struct ProgressObserver {
    bar: ProgressBar,
    inner: TracingObserver,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames tagged ({per_sec:.1.yellow}, {eta})")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self {
            bar,
            inner: TracingObserver,
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineObserver for ProgressObserver {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::StageStarted(PipelineStage::Tagging) => {
                self.bar
                    .set_draw_target(indicatif::ProgressDrawTarget::stderr());
            }
            PipelineEvent::FrameTagged {
                completed, total, ..
            } => {
                self.bar.set_length(*total as u64);
                self.bar.set_position(*completed as u64);
            }
            PipelineEvent::StageCompleted {
                stage: PipelineStage::Tagging,
                ..
            } => self.bar.finish_and_clear(),
            PipelineEvent::Failed(_) => self.bar.abandon(),
            _ => {}
        }
        self.inner.on_event(event);
    }
}
