use crate::run_artifacts::{BoundingBox, NormalizedBox};
use image::GrayImage;

/// Upper bound of the detector's normalized coordinate space.
pub const NORMALIZED_SCALE: i64 = 1000;

/// Pixels added on every side of the detector's box before clamping.
pub const WINDOW_PAD: u32 = 4;

/// Map one normalized coordinate onto `[0, dim]`, flooring.
fn denormalize(value: i64, dim: u32) -> u32 {
    let value = value.clamp(0, NORMALIZED_SCALE) as u64;
    (value * dim as u64 / NORMALIZED_SCALE as u64) as u32
}

/// Convert a 0..=1000 box to absolute pixels, pad by `pad` and clamp to the
/// frame. `None` when the result would have zero area.
pub fn to_pixel_box(norm: &NormalizedBox, width: u32, height: u32, pad: u32) -> Option<BoundingBox> {
    let x1 = denormalize(norm.x1, width).saturating_sub(pad);
    let y1 = denormalize(norm.y1, height).saturating_sub(pad);
    let x2 = denormalize(norm.x2, width).saturating_add(pad).min(width);
    let y2 = denormalize(norm.y2, height).saturating_add(pad).min(height);

    BoundingBox::new(x1, y1, x2, y2, width, height)
}

/// Axis-aligned extent of all non-zero pixels in `mask`.
///
/// The upper bounds are exclusive (`max + 1`), so the box covers every
/// positive pixel and a single positive pixel yields a 1x1 box. This is one
/// pixel wider on the right and bottom than an inclusive `max` extent.
/// `None` for an empty mask.
pub fn mask_extent(mask: &GrayImage) -> Option<BoundingBox> {
    let (width, height) = mask.dimensions();
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut any = false;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] > 0 {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !any {
        return None;
    }

    BoundingBox::new(min_x, min_y, max_x + 1, max_y + 1, width, height)
}
