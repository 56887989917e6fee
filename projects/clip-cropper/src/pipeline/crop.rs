// Crop stage: cuts the final window out of every extracted still.

use crate::error::{chain, PipelineError, PipelineResult};
use crate::pipeline::reader::write_jpeg;
use crate::pipeline::types::FrameSequence;
use crate::run_artifacts::BoundingBox;
use crate::video::processor::frame_progress;
use anyhow::{anyhow, Context, Result};
use opencv::prelude::*;
use opencv::{core, imgcodecs};
use std::path::Path;
use std::time::Instant;

/// Crops a Mat to a pixel bounding box.
///
/// The box was resolved against the first frame, so `img` must have the same
/// size; anything else is an error rather than a silently shifted window.
pub fn crop_to_box(img: &core::Mat, bbox: &BoundingBox) -> Result<core::Mat> {
    let size = img.size()?;
    if size.width != bbox.frame_width as i32 || size.height != bbox.frame_height as i32 {
        anyhow::bail!(
            "Frame is {}x{} but the window was resolved for {}x{}",
            size.width,
            size.height,
            bbox.frame_width,
            bbox.frame_height
        );
    }

    let roi = core::Rect::new(
        bbox.x1 as i32,
        bbox.y1 as i32,
        bbox.width() as i32,
        bbox.height() as i32,
    );
    let cropped = core::Mat::roi(img, roi)?;

    let mut out = core::Mat::default();
    cropped.copy_to(&mut out)?;

    Ok(out)
}

fn read_frame(path: &Path) -> Result<core::Mat> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {:?}", path))?;
    let mat = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
    if mat.empty() {
        return Err(anyhow!("Could not decode {}", path_str));
    }
    Ok(mat)
}

/// Crop every frame of `frames` into `crop_dir`, keeping file names.
pub fn crop_frames(
    frames: &FrameSequence,
    bbox: &BoundingBox,
    crop_dir: &Path,
    jpeg_quality: i32,
) -> PipelineResult<FrameSequence> {
    let start = Instant::now();
    let pb = frame_progress(frames.len(), "crop").map_err(|e| PipelineError::crop(chain(&e)))?;

    for frame in &frames.frames {
        let result = read_frame(&frame.path)
            .and_then(|mat| crop_to_box(&mat, bbox))
            .and_then(|cropped| write_jpeg(&crop_dir.join(frame.name()), &cropped, jpeg_quality))
            .with_context(|| format!("Failed to crop {}", frame.path.display()));

        if let Err(e) = result {
            pb.abandon();
            return Err(PipelineError::crop(chain(&e)));
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let cropped = FrameSequence::scan(crop_dir).map_err(|e| PipelineError::workspace(chain(&e)))?;

    tracing::info!(
        "Cropped {} frames to {} in {:.2}s",
        cropped.len(),
        bbox.resolution(),
        start.elapsed().as_secs_f64()
    );

    Ok(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::FrameFile;
    use crate::test_support::write_test_jpeg;
    use std::fs;

    fn solid(w: i32, h: i32) -> core::Mat {
        core::Mat::new_rows_cols_with_default(h, w, core::CV_8UC3, core::Scalar::all(128.0)).unwrap()
    }

    #[test]
    fn test_crop_to_box_has_box_size() {
        let img = solid(640, 480);
        let bbox = BoundingBox::new(60, 20, 580, 460, 640, 480).unwrap();
        let out = crop_to_box(&img, &bbox).unwrap();
        let size = out.size().unwrap();
        assert_eq!((size.width, size.height), (520, 440));
    }

    #[test]
    fn test_crop_rejects_frame_of_other_size() {
        let img = solid(320, 240);
        let bbox = BoundingBox::new(60, 20, 580, 460, 640, 480).unwrap();
        assert!(crop_to_box(&img, &bbox).is_err());
    }

    #[test]
    fn test_crop_frames_keeps_names_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        let crop_dir = dir.path().join("cropped");
        fs::create_dir(&frames_dir).unwrap();
        fs::create_dir(&crop_dir).unwrap();
        for i in 0..3 {
            write_test_jpeg(&frames_dir.join(FrameFile::file_name(i)), 64, 48).unwrap();
        }

        let frames = FrameSequence::scan(&frames_dir).unwrap();
        let bbox = BoundingBox::new(8, 4, 40, 36, 64, 48).unwrap();
        let cropped = crop_frames(&frames, &bbox, &crop_dir, 90).unwrap();

        let names: Vec<&str> = cropped.frames.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["000000000.jpg", "000000001.jpg", "000000002.jpg"]);
        assert_eq!(image::image_dimensions(&cropped.frames[1].path).unwrap(), (32, 32));
    }

    #[test]
    fn test_mismatched_frame_is_crop_error() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        let crop_dir = dir.path().join("cropped");
        fs::create_dir(&frames_dir).unwrap();
        fs::create_dir(&crop_dir).unwrap();
        write_test_jpeg(&frames_dir.join(FrameFile::file_name(0)), 64, 48).unwrap();
        write_test_jpeg(&frames_dir.join(FrameFile::file_name(1)), 32, 24).unwrap();

        let frames = FrameSequence::scan(&frames_dir).unwrap();
        let bbox = BoundingBox::new(8, 4, 40, 36, 64, 48).unwrap();
        let err = crop_frames(&frames, &bbox, &crop_dir, 90).unwrap_err();
        assert!(matches!(err, PipelineError::Crop(_)), "{err:?}");
    }
}
