use crate::run_artifacts::BoundingBox;
use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Binary mask at input-frame resolution: non-zero = inside the object.
pub type Mask = GrayImage;

/// Trait for promptable segmentation models
/// Allows swapping the ONNX SAM backend for stubs or other models.
pub trait SegmentationModel {
    /// Segment the object enclosed by `prompt`.
    ///
    /// Returns zero or more masks, best first, each with the same dimensions
    /// as `frame`.
    fn segment(&mut self, frame: &RgbImage, prompt: &BoundingBox) -> Result<Vec<Mask>>;
}
