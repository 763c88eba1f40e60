mod cli;
mod error;
mod pipeline;
mod run_artifacts;
mod run_context;
#[cfg(test)]
mod test_utils;
mod tools;

use anyhow::Result;
use cli::Args;
use pipeline::events::ProgressObserver;
use pipeline::orchestrator::{Pipeline, ProcessingState};
use run_context::RunContext;
use std::sync::Arc;
use tools::exiftool::ExifTool;
use tools::ffmpeg::Ffmpeg;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse_args();
    let context = RunContext::prepare(&args.input, &args.output_dir, args.overwrite)?;

    let state = Arc::new(ProcessingState::new(context.run_id.clone()));
    {
        let state = state.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling run {}", state.run_id);
                state.cancel();
            }
        });
    }

    let exiftool = ExifTool::new(
        args.exiftool.clone(),
        args.tool_timeout(),
        state.cancel_signal(),
    );
    let ffmpeg = Ffmpeg::new(
        args.ffmpeg.clone(),
        args.decode_timeout(),
        args.jpeg_quality,
        state.cancel_signal(),
    );
    let observer = ProgressObserver::new();

    let pipeline = Pipeline {
        metadata_tool: &exiftool,
        decoder: &ffmpeg,
        config: args.pipeline_config(),
        state: state.as_ref(),
        observer: &observer,
    };

    let outcome = pipeline.run(&context.video_path, &context.output_dir).await;
    tracing::debug!("Final state: {}", state.to_progress_json());

    let summary = outcome?;
    context.write_summary(&summary)?;

    println!(
        "{} frames written to {} ({:.3} km)",
        summary.entries.len(),
        context.output_dir.display(),
        summary.total_km
    );
    Ok(())
}
