// Fixtures shared by the unit tests: synthetic media and stub models.

use crate::run_artifacts::BoundingBox;
use crate::segmentation::{Mask, SegmentationModel};
use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use opencv::prelude::*;
use opencv::{core, imgproc, videoio};
use std::path::Path;

/// Green level of the backdrop in frame `index`. Steps of 10 survive JPEG
/// compression, so decoded frames can be checked for order.
pub fn backdrop_green(index: usize) -> f64 {
    20.0 + 10.0 * (index % 20) as f64
}

/// Write an MJPG video of `frames` frames: a light panel on a dark backdrop.
pub fn write_test_video(path: &Path, frames: usize, fps: f64, width: i32, height: i32) -> Result<()> {
    let path_str = path.to_str().ok_or_else(|| anyhow!("non UTF-8 path"))?;
    let fourcc = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G')?;
    let mut writer = videoio::VideoWriter::new(path_str, fourcc, fps, core::Size::new(width, height), true)?;
    if !writer.is_opened()? {
        return Err(anyhow!("could not open test writer for {}", path_str));
    }

    for i in 0..frames {
        let mut mat = core::Mat::new_rows_cols_with_default(
            height,
            width,
            core::CV_8UC3,
            core::Scalar::new(30.0, backdrop_green(i), 60.0, 0.0),
        )?;
        let panel = core::Rect::new(width / 10, height / 20, width * 8 / 10, height * 18 / 20);
        imgproc::rectangle(
            &mut mat,
            panel,
            core::Scalar::new(200.0, 200.0, 200.0, 0.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
        writer.write(&mat)?;
    }
    writer.release()?;
    Ok(())
}

/// Write a gradient JPEG of the given size.
pub fn write_test_jpeg(path: &Path, width: u32, height: u32) -> Result<()> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    img.save(path)?;
    Ok(())
}

/// Segmentation model that always errors.
pub struct FailingModel;

impl SegmentationModel for FailingModel {
    fn segment(&mut self, _frame: &RgbImage, _prompt: &BoundingBox) -> Result<Vec<Mask>> {
        Err(anyhow!("inference backend unavailable"))
    }
}

/// Segmentation model that returns the same masks for every call.
pub struct FixedMaskModel {
    masks: Vec<Mask>,
}

impl FixedMaskModel {
    pub fn new(masks: Vec<Mask>) -> Self {
        Self { masks }
    }
}

impl SegmentationModel for FixedMaskModel {
    fn segment(&mut self, _frame: &RgbImage, _prompt: &BoundingBox) -> Result<Vec<Mask>> {
        Ok(self.masks.clone())
    }
}
