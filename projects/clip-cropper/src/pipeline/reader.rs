// Extraction stage: decodes the input video into numbered JPEG stills.

use crate::error::{chain, PipelineError, PipelineResult};
use crate::pipeline::types::{ExtractedVideo, FrameFile, FrameSequence};
use crate::video::processor::for_each_frame;
use crate::video::Backend;
use anyhow::{anyhow, Context, Result};
use opencv::core::{self, Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use std::path::Path;

/// Write `mat` as a JPEG at `path`.
pub fn write_jpeg(path: &Path, mat: &Mat, quality: i32) -> Result<()> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {:?}", path))?;
    let params = Vector::<i32>::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, quality.clamp(0, 100)]);
    if !imgcodecs::imwrite(path_str, mat, &params)? {
        return Err(anyhow!("imwrite refused {}", path_str));
    }
    Ok(())
}

/// Decode `input` into `frames_dir` as `000000000.jpg`, `000000001.jpg`, ...
///
/// Frame size is taken from the first decoded frame. Fails with
/// `MediaRead` if the video cannot be opened or yields no frames.
pub fn extract_frames(
    input: &Path,
    frames_dir: &Path,
    backend: Backend,
    jpeg_quality: i32,
) -> PipelineResult<ExtractedVideo> {
    let mut frame_size: Option<core::Size> = None;

    let stats = for_each_frame(input, backend, |index: usize, frame: Mat| -> Result<()> {
        if frame_size.is_none() {
            frame_size = Some(frame.size()?);
        }
        let path = frames_dir.join(FrameFile::file_name(index));
        write_jpeg(&path, &frame, jpeg_quality)
            .with_context(|| format!("Failed to write frame {}", index))
    })
    .with_context(|| format!("Failed to extract frames from {}", input.display()))
    .map_err(|e| PipelineError::media_read(chain(&e)))?;

    let size = match frame_size {
        Some(size) if stats.processed_frames > 0 => size,
        _ => {
            return Err(PipelineError::media_read(format!(
                "No frames decoded from {}",
                input.display()
            )))
        }
    };

    let frames = FrameSequence::scan(frames_dir).map_err(|e| PipelineError::workspace(chain(&e)))?;
    if frames.is_empty() {
        return Err(PipelineError::media_read(format!(
            "No frames written for {}",
            input.display()
        )));
    }

    tracing::info!(
        "Extracted {} frames ({}x{} @ {:.2} fps) in {:.2}s",
        frames.len(),
        size.width,
        size.height,
        stats.source_fps,
        stats.duration.as_secs_f64()
    );

    Ok(ExtractedVideo {
        frames,
        fps: stats.source_fps,
        width: size.width as u32,
        height: size.height as u32,
    })
}
