// Pipeline orchestrator: runs one video through every stage in order.
//
// extract -> detect -> refine -> crop -> encode -> publish. The scratch
// workspace is released when `process_video` returns, whichever way it does.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::crop::crop_frames;
use crate::pipeline::detection::WindowDetector;
use crate::pipeline::encode::encode_frames;
use crate::pipeline::reader::extract_frames;
use crate::pipeline::refine::{BoxRefiner, Refinement};
use crate::pipeline::types::{ExtractedVideo, PipelineConfig};
use crate::run_artifacts::{BoundingBox, PipelineMetadata};
use crate::run_context::{publish_output, Workspace};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Summarize a finished run. `frames` counts extracted frames; encoder skips
/// only show up in `frames_written`.
fn run_metadata(
    video: &ExtractedVideo,
    written: usize,
    detected: BoundingBox,
    refinement: Refinement,
) -> PipelineMetadata {
    let extracted = video.frames.len();
    if written < extracted {
        tracing::warn!(
            "Encoded {} of {} extracted frames; the rest could not be decoded",
            written,
            extracted
        );
    }
    PipelineMetadata::new(
        extracted,
        written,
        video.fps,
        detected,
        refinement.bbox,
        refinement.outcome,
    )
}

/// Crop `input` to its embedded clip window.
///
/// Returns the published output path (owned by the caller from here on) and
/// the run metadata.
pub fn process_video(
    input: &Path,
    config: &PipelineConfig,
    detector: &dyn WindowDetector,
    refiner: &mut dyn BoxRefiner,
) -> PipelineResult<(PathBuf, PipelineMetadata)> {
    if !input.is_file() {
        return Err(PipelineError::media_read(format!(
            "Input video not found: {}",
            input.display()
        )));
    }

    let start = Instant::now();
    let workspace = Workspace::create(&config.scratch_root)?;
    info!("Processing {} in {}", input.display(), workspace.path().display());

    let video = extract_frames(
        input,
        &workspace.frames_dir(),
        config.backend,
        config.jpeg_quality,
    )?;
    let first = video
        .frames
        .first()
        .ok_or_else(|| PipelineError::media_read(format!("No frames extracted from {}", input.display())))?;

    let detected = detector.detect(first)?;
    info!("Detected window {:?}", detected);

    let refinement = refiner.refine(first, &detected);
    let bbox = refinement.bbox;

    let cropped = crop_frames(&video.frames, &bbox, &workspace.crop_dir(), config.jpeg_quality)?;

    let encoded = workspace.output_path(config.codec.extension());
    let written = encode_frames(
        &cropped.dir,
        video.fps,
        (bbox.width(), bbox.height()),
        config.codec,
        &encoded,
    )?;

    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("video");
    let published = publish_output(&encoded, &config.output_dir, stem, config.codec.extension())?;

    let metadata = run_metadata(&video, written, detected, refinement);

    info!(
        "Finished {} -> {} ({}/{} frames, {}) in {:.2}s",
        input.display(),
        published.display(),
        metadata.frames_written,
        metadata.frames,
        metadata.resolution,
        start.elapsed().as_secs_f64()
    );

    Ok((published, metadata))
}
