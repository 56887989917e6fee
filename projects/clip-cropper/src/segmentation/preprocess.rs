use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};

/// Side length of the square SAM encoder input.
pub const SAM_INPUT_SIZE: u32 = 1024;

/// Per-channel RGB mean/std used by the SAM image encoder.
const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Resizes a frame so its longest side is `SAM_INPUT_SIZE`, normalizes it and
/// pads the result to a square NCHW tensor.
pub struct Preprocessor {
    target: u32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            target: SAM_INPUT_SIZE,
        }
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Scale applied to the frame (and to prompt coordinates).
    pub fn scale(&self, width: u32, height: u32) -> f32 {
        self.target as f32 / width.max(height).max(1) as f32
    }

    /// Resized dimensions, rounded to the nearest pixel.
    pub fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let scale = self.scale(width, height);
        let w = ((width as f32 * scale) + 0.5).floor() as u32;
        let h = ((height as f32 * scale) + 0.5).floor() as u32;
        (w.clamp(1, self.target), h.clamp(1, self.target))
    }

    /// Build the `[1, 3, target, target]` input, row-major, flattened.
    ///
    /// Padding (bottom and right) is zero after normalization.
    pub fn preprocess(&self, frame: &RgbImage) -> Result<Vec<f32>> {
        let _span = tracing::debug_span!("sam_preprocess").entered();

        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("Cannot preprocess an empty frame"));
        }

        let (rw, rh) = self.resized_dims(width, height);
        let resized = imageops::resize(frame, rw, rh, imageops::FilterType::Triangle);

        let side = self.target as usize;
        let plane = side * side;
        let mut tensor = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * side + x as usize;
            for c in 0..3 {
                tensor[c * plane + offset] = (pixel[c] as f32 - PIXEL_MEAN[c]) / PIXEL_STD[c];
            }
        }

        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_longest_side_becomes_target() {
        let pre = Preprocessor::new();
        assert_eq!(pre.resized_dims(640, 480), (1024, 768));
        assert_eq!(pre.resized_dims(480, 640), (768, 1024));
        assert_eq!(pre.resized_dims(2048, 1024), (1024, 512));
        assert!((pre.scale(640, 480) - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_tensor_is_normalized_and_padded() {
        let pre = Preprocessor::new();
        let frame = RgbImage::from_pixel(64, 32, Rgb([255, 0, 128]));
        let tensor = pre.preprocess(&frame).unwrap();

        let side = SAM_INPUT_SIZE as usize;
        let plane = side * side;
        assert_eq!(tensor.len(), 3 * plane);

        // Inside the resized region (top-left pixel).
        assert!((tensor[0] - (255.0 - 123.675) / 58.395).abs() < 1e-3);
        assert!((tensor[plane] - (0.0 - 116.28) / 57.12).abs() < 1e-3);

        // Resized frame is 1024x512, so the bottom row is padding.
        let last_row = (side - 1) * side;
        assert_eq!(tensor[last_row], 0.0);
        assert_eq!(tensor[2 * plane + last_row + side - 1], 0.0);
    }
}
