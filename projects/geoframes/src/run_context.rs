use crate::pipeline::split::list_frames;
use crate::run_artifacts::{PointRow, RunMetadata, SequenceSummary};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = ".geoframes.lock";

/// Output directory of one pipeline run, held exclusively for its lifetime.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: String,
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
    lock_path: PathBuf,
}

impl RunContext {
    /// Creates (if needed) and locks `output_dir` for processing `video_path`.
    ///
    /// Frames left by an earlier run are an error unless `overwrite` is set,
    /// in which case they are removed.
    pub fn prepare(video_path: &Path, output_dir: &Path, overwrite: bool) -> Result<Self> {
        if !video_path.is_file() {
            anyhow::bail!("Video file NOT FOUND at: {:?}", video_path);
        }

        let run_id = video_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid video name: {:?}", video_path))?
            .to_string();

        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

        let lock_path = output_dir.join(LOCK_FILE);
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .with_context(|| {
                format!(
                    "Output directory {:?} is in use by another run (remove {} if stale)",
                    output_dir, LOCK_FILE
                )
            })?;

        let context = Self {
            run_id,
            video_path: video_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            lock_path,
        };

        let stale = list_frames(output_dir);
        if !stale.is_empty() {
            if !overwrite {
                anyhow::bail!(
                    "Output directory {:?} already contains {} frames; pass --overwrite to replace them",
                    output_dir,
                    stale.len()
                );
            }
            tracing::info!("Removing {} frames from a previous run", stale.len());
            for frame in stale {
                fs::remove_file(output_dir.join(&frame))
                    .with_context(|| format!("Failed to remove stale frame {}", frame))?;
            }
        }

        Ok(context)
    }

    /// Writes sequence.json, points.csv and metadata.json.
    pub fn write_summary(&self, summary: &SequenceSummary) -> Result<()> {
        let sequence_path = self.output_dir.join("sequence.json");
        fs::write(&sequence_path, serde_json::to_string_pretty(summary)?)
            .with_context(|| format!("Failed to write {:?}", sequence_path))?;

        let points_path = self.output_dir.join("points.csv");
        let mut writer = csv::Writer::from_path(&points_path)
            .with_context(|| format!("Failed to create {:?}", points_path))?;
        for entry in &summary.entries {
            writer.serialize(PointRow::from(entry))?;
        }
        writer.flush()?;

        let metadata = RunMetadata {
            source_video: self.video_path.display().to_string(),
            created_at: Utc::now(),
            run_id: self.run_id.clone(),
            frame_count: summary.entries.len(),
            start_time: summary.start_time,
            total_km: summary.total_km,
        };
        let metadata_path = self.output_dir.join("metadata.json");
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)
            .with_context(|| format!("Failed to write {:?}", metadata_path))?;

        tracing::info!(
            "Wrote {} sequence entries to {:?}",
            summary.entries.len(),
            self.output_dir
        );
        Ok(())
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!("Failed to release {:?}: {}", self.lock_path, e);
        }
    }
}
