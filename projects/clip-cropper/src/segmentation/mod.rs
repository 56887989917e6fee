mod preprocess;
mod sam;
pub mod types;

pub use sam::{SamConfig, SamModel};
pub use types::{Mask, SegmentationModel};

use anyhow::Result;

/// Load the ONNX SAM encoder/decoder pair as a boxed model.
pub fn load_sam(config: &SamConfig) -> Result<Box<dyn SegmentationModel>> {
    let model = SamModel::load(config)?;
    Ok(Box::new(model))
}
