use crate::pipeline::extract::Hemisphere;
use crate::pipeline::geodesy::BearingFormula;
use crate::pipeline::orchestrator::PipelineConfig;
use crate::tools::RetryPolicy;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Split a GPS-tagged video into geotagged still frames.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video file with an embedded GPS track
    #[arg(long, short)]
    pub input: PathBuf,

    /// Directory that receives the frames and run artifacts
    #[arg(long, short, env = "GEOFRAMES_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// exiftool executable
    #[arg(long, env = "GEOFRAMES_EXIFTOOL", default_value = "exiftool")]
    pub exiftool: PathBuf,

    /// ffmpeg executable
    #[arg(long, env = "GEOFRAMES_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Maximum concurrent metadata writes (defaults to the number of CPUs)
    #[arg(long, env = "GEOFRAMES_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Timeout for each exiftool invocation, in seconds
    #[arg(long, env = "GEOFRAMES_TOOL_TIMEOUT_SECS", default_value_t = 120)]
    pub tool_timeout_secs: u64,

    /// Timeout for frame decoding, in seconds (unbounded when unset)
    #[arg(long, env = "GEOFRAMES_DECODE_TIMEOUT_SECS")]
    pub decode_timeout_secs: Option<u64>,

    /// Extra attempts for metadata reads and writes that time out
    #[arg(long, env = "GEOFRAMES_RETRIES", default_value_t = 2)]
    pub retries: u32,

    /// Delay before the first retry, doubled for each further attempt
    #[arg(long, default_value_t = 250)]
    pub retry_backoff_ms: u64,

    /// JPEG quality passed to ffmpeg (2 = best, 31 = worst)
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=31))]
    pub jpeg_quality: u8,

    /// Bearing formula used when linking frames
    #[arg(long, value_enum, default_value_t = BearingFormula::Geodetic)]
    pub bearing: BearingFormula,

    /// Hemisphere letters that make coordinates negative
    #[arg(long, value_enum, default_value_t = Hemisphere::Inverted)]
    pub hemisphere: Hemisphere,

    /// Replace frames left in the output directory by an earlier run
    #[arg(long)]
    pub overwrite: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency).max(1),
            retry: RetryPolicy {
                retries: self.retries,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            hemisphere: self.hemisphere,
            bearing: self.bearing,
        }
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.tool_timeout_secs)).filter(|d| !d.is_zero())
    }

    pub fn decode_timeout(&self) -> Option<Duration> {
        self.decode_timeout_secs.map(Duration::from_secs)
    }
}
