// Frame splitter: one still image per second of video

use crate::error::PipelineError;
use crate::tools::FrameDecoder;
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// Filename of the frame at zero-based second `offset`.
pub fn frame_filename(offset: usize) -> String {
    format!("_{}.jpg", offset + 1)
}

/// 1-based frame number of a `_<n>.jpg` filename.
pub fn frame_number(filename: &str) -> Option<usize> {
    filename
        .strip_prefix('_')?
        .strip_suffix(".jpg")?
        .parse()
        .ok()
        .filter(|n| *n > 0)
}

/// Number of frames requested from the decoder for a video of `duration_secs`.
pub fn target_frame_count(duration_secs: f64) -> usize {
    duration_secs.max(0.0).ceil() as usize + 1
}

/// Runs the decoder and returns the produced frame filenames in frame order.
pub async fn split_frames<D: FrameDecoder>(
    decoder: &D,
    input: &Path,
    frame_count: usize,
    output_dir: &Path,
) -> Result<Vec<String>, PipelineError> {
    decoder
        .decode_frames(input, frame_count, output_dir)
        .await
        .map_err(|e| PipelineError::decode(input.to_path_buf(), e))?;

    let frames = list_frames(output_dir);
    tracing::info!(
        "Decoder produced {} of {} requested frames",
        frames.len(),
        frame_count
    );
    Ok(frames)
}

/// Frame files directly inside `dir`, sorted by frame number.
pub fn list_frames(dir: &Path) -> Vec<String> {
    let mut frames: Vec<(usize, String)> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter_map(|name| frame_number(&name).map(|n| (n, name)))
        .collect();
    frames.sort_by_key(|(n, _)| *n);
    frames.into_iter().map(|(_, name)| name).collect()
}

/// Checks that frames `_1.jpg..=_<required>.jpg` are all present.
pub fn ensure_dense(
    frames: &[String],
    required: usize,
    input: &Path,
) -> Result<(), PipelineError> {
    let present: BTreeSet<usize> = frames.iter().filter_map(|f| frame_number(f)).collect();
    let missing: Vec<usize> = (1..=required).filter(|n| !present.contains(n)).collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(PipelineError::Decode {
        path: input.to_path_buf(),
        reason: format!(
            "{} of {} frames missing (first missing: _{}.jpg)",
            missing.len(),
            required,
            missing[0]
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeDecoder;

    #[test]
    fn test_frame_naming() {
        assert_eq!(frame_filename(0), "_1.jpg");
        assert_eq!(frame_filename(9), "_10.jpg");
        assert_eq!(frame_number("_10.jpg"), Some(10));
        assert_eq!(frame_number("_0.jpg"), None);
        assert_eq!(frame_number("frame_1.jpg"), None);
        assert_eq!(frame_number("_1.png"), None);
    }

    #[test]
    fn test_target_frame_count() {
        assert_eq!(target_frame_count(10.0), 11);
        assert_eq!(target_frame_count(10.2), 12);
        assert_eq!(target_frame_count(0.0), 1);
    }

    #[tokio::test]
    async fn test_split_lists_frames_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let decoder = FakeDecoder::producing(12);
        let frames = split_frames(&decoder, Path::new("in.mp4"), 12, dir.path())
            .await
            .unwrap();

        assert_eq!(frames.len(), 12);
        assert_eq!(frames[0], "_1.jpg");
        assert_eq!(frames[1], "_2.jpg");
        assert_eq!(frames[11], "_12.jpg");
        assert_eq!(decoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_split_failure_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = FakeDecoder::failing();
        let err = split_frames(&decoder, Path::new("in.mp4"), 4, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[test]
    fn test_ensure_dense_reports_gaps() {
        let frames = vec!["_1.jpg".to_string(), "_3.jpg".to_string()];
        assert!(ensure_dense(&frames, 1, Path::new("in.mp4")).is_ok());
        let err = ensure_dense(&frames, 3, Path::new("in.mp4")).unwrap_err();
        assert!(err.to_string().contains("_2.jpg"));
    }
}
