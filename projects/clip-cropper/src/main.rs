mod cli;
mod error;
mod pipeline;
mod run_artifacts;
mod run_context;
mod segmentation;
#[cfg(test)]
mod test_support;
mod video;

use anyhow::{Context, Result};
use cli::Args;
use pipeline::detection::GeminiDetector;
use pipeline::orchestrator::process_video;
use pipeline::refine::{BoxRefiner, MaskRefiner, PassThroughRefiner};
use run_context::write_metadata_sidecar;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))?
        .add_directive("ort=warn".parse()?);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(env_filter)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse_args();
    init_tracing(args.debug)?;

    let detector = GeminiDetector::new(args.gemini_config())?;
    let mut refiner: Box<dyn BoxRefiner> = if args.no_refine {
        Box::new(PassThroughRefiner)
    } else {
        let sam = args.sam_config();
        Box::new(MaskRefiner::lazy(move || segmentation::load_sam(&sam)))
    };

    let config = args.pipeline_config();
    let (output, metadata) = match process_video(&args.input, &config, &detector, refiner.as_mut()) {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Pipeline failed at {} stage: {}", e.stage(), e);
            return Err(e.into());
        }
    };

    if let Some(path) = &args.metadata_out {
        write_metadata_sidecar(path, &metadata)?;
    }

    let summary = serde_json::json!({
        "output": output,
        "metadata": metadata,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
    );

    Ok(())
}
