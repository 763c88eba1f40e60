use super::{run_tool, CancelSignal, FrameDecoder, ToolError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Output pattern understood by ffmpeg's image2 muxer: `_1.jpg`, `_2.jpg`, ...
pub const FRAME_PATTERN: &str = "_%d.jpg";

/// Frame decoder backed by the `ffmpeg` binary.
pub struct Ffmpeg {
    program: PathBuf,
    timeout: Option<Duration>,
    jpeg_quality: u8,
    cancel: CancelSignal,
}

impl Ffmpeg {
    pub fn new(
        program: impl Into<PathBuf>,
        timeout: Option<Duration>,
        jpeg_quality: u8,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            program: program.into(),
            timeout,
            jpeg_quality,
            cancel,
        }
    }

    fn build_command(&self, input: &Path, frame_count: usize, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-vf", "fps=1", "-frames:v"])
            .arg(frame_count.to_string())
            .arg("-q:v")
            .arg(self.jpeg_quality.to_string())
            .args(["-start_number", "1"])
            .arg(output_dir.join(FRAME_PATTERN));
        cmd
    }
}

impl FrameDecoder for Ffmpeg {
    async fn decode_frames(
        &self,
        input: &Path,
        frame_count: usize,
        output_dir: &Path,
    ) -> Result<(), ToolError> {
        tracing::info!(
            "Extracting {} frames from {} into {}",
            frame_count,
            input.display(),
            output_dir.display()
        );
        let cmd = self.build_command(input, frame_count, output_dir);
        let program = self.program.display().to_string();
        run_tool(cmd, &program, self.timeout, &self.cancel).await?;
        Ok(())
    }
}
