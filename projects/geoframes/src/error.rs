// Error taxonomy for the geotagging pipeline
//
// Stage-global failures abort the run and identify the stage that failed.
// Per-sample parse failures are absorbed by the extractor and never leave it.

use crate::pipeline::types::PipelineStage;
use crate::tools::ToolError;
use std::path::PathBuf;
use thiserror::Error;

/// A failure that short-circuits the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The metadata tool could not read the video (tool failure or unreadable file).
    #[error("failed to read metadata from {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    /// The container metadata was readable but unusable (no samples, no duration).
    #[error("unusable metadata in {path}: {reason}")]
    MetadataInvalid { path: PathBuf, reason: String },

    /// The frame decoder failed or produced an incomplete frame set.
    #[error("failed to split {path} into frames: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Writing the geotag of a single frame failed.
    #[error("failed to write tags to {path}: {source}")]
    MetadataWrite {
        path: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("pipeline cancelled during {stage}")]
    Cancelled { stage: PipelineStage },
}

impl PipelineError {
    /// The stage the error originated from.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::MetadataRead { .. } | Self::MetadataInvalid { .. } => PipelineStage::Extracting,
            Self::Decode { .. } => PipelineStage::Splitting,
            Self::MetadataWrite { .. } => PipelineStage::Tagging,
            Self::Cancelled { stage } => *stage,
        }
    }

    /// Builds the error for a decoder failure, mapping cancellation through.
    pub fn decode(path: PathBuf, err: ToolError) -> Self {
        match err {
            ToolError::Cancelled => Self::Cancelled {
                stage: PipelineStage::Splitting,
            },
            other => Self::Decode {
                path,
                reason: other.to_string(),
            },
        }
    }

    pub fn metadata_read(path: PathBuf, err: ToolError) -> Self {
        match err {
            ToolError::Cancelled => Self::Cancelled {
                stage: PipelineStage::Extracting,
            },
            source => Self::MetadataRead { path, source },
        }
    }

    pub fn metadata_write(path: PathBuf, err: ToolError) -> Self {
        match err {
            ToolError::Cancelled => Self::Cancelled {
                stage: PipelineStage::Tagging,
            },
            source => Self::MetadataWrite { path, source },
        }
    }
}

/// A single malformed GPS sample. Logged and skipped by the extractor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleParseError {
    #[error("missing tag {0}")]
    MissingTag(String),

    #[error("invalid sample time {0:?}")]
    InvalidSampleTime(String),

    #[error("invalid coordinate {0:?}")]
    InvalidCoordinate(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}
