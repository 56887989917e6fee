//! Box refinement with a promptable segmentation model.
//!
//! Refinement never fails the pipeline: every internal error turns into a
//! `PassThrough` outcome carrying the detector's box unchanged.

use crate::pipeline::geometry::mask_extent;
use crate::pipeline::types::FrameFile;
use crate::run_artifacts::{BoundingBox, RefineOutcome};
use crate::segmentation::SegmentationModel;
use anyhow::Context;
use thiserror::Error;
use tracing::{info, warn};

/// Why a refinement attempt produced no box. Never leaves this module.
#[derive(Debug, Error)]
enum RefineError {
    #[error("segmentation model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("{0:#}")]
    Inference(anyhow::Error),

    #[error("model returned no mask")]
    NoMask,

    #[error("mask has no positive pixels")]
    EmptyMask,

    #[error("mask is {mask_w}x{mask_h} but frame is {frame_w}x{frame_h}")]
    SizeMismatch {
        mask_w: u32,
        mask_h: u32,
        frame_w: u32,
        frame_h: u32,
    },
}

/// Final box plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub bbox: BoundingBox,
    pub outcome: RefineOutcome,
}

impl Refinement {
    pub fn pass_through(bbox: &BoundingBox, reason: impl Into<String>) -> Self {
        Self {
            bbox: *bbox,
            outcome: RefineOutcome::PassThrough {
                reason: reason.into(),
            },
        }
    }
}

/// Tightens the detector's box. Infallible by contract.
pub trait BoxRefiner {
    fn refine(&mut self, frame: &FrameFile, bbox: &BoundingBox) -> Refinement;
}

/// Refiner used when refinement is switched off.
pub struct PassThroughRefiner;

impl BoxRefiner for PassThroughRefiner {
    fn refine(&mut self, _frame: &FrameFile, bbox: &BoundingBox) -> Refinement {
        info!("Refinement disabled, keeping detector box");
        Refinement::pass_through(bbox, "refinement disabled")
    }
}

type ModelLoader = Box<dyn FnOnce() -> anyhow::Result<Box<dyn SegmentationModel>>>;

/// Refines with the first mask a [`SegmentationModel`] returns for the box
/// prompt. The model can be loaded lazily on first use; a load failure is a
/// refinement failure like any other.
pub struct MaskRefiner {
    model: Option<Box<dyn SegmentationModel>>,
    loader: Option<ModelLoader>,
    load_error: Option<String>,
}

impl MaskRefiner {
    pub fn new(model: Box<dyn SegmentationModel>) -> Self {
        Self {
            model: Some(model),
            loader: None,
            load_error: None,
        }
    }

    pub fn lazy<F>(loader: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Box<dyn SegmentationModel>> + 'static,
    {
        Self {
            model: None,
            loader: Some(Box::new(loader)),
            load_error: None,
        }
    }

    fn model(&mut self) -> Result<&mut Box<dyn SegmentationModel>, RefineError> {
        if self.model.is_none() {
            if let Some(loader) = self.loader.take() {
                match loader() {
                    Ok(model) => self.model = Some(model),
                    Err(e) => self.load_error = Some(format!("{:#}", e)),
                }
            }
        }

        match self.model.as_mut() {
            Some(model) => Ok(model),
            None => Err(RefineError::ModelUnavailable(
                self.load_error
                    .clone()
                    .unwrap_or_else(|| "no model configured".to_string()),
            )),
        }
    }

    fn try_refine(&mut self, frame: &FrameFile, bbox: &BoundingBox) -> Result<BoundingBox, RefineError> {
        let model = self.model()?;

        let image = image::open(&frame.path)
            .with_context(|| format!("Failed to open {}", frame.path.display()))
            .map_err(RefineError::Inference)?
            .to_rgb8();

        let masks = model.segment(&image, bbox).map_err(RefineError::Inference)?;
        let mask = masks.first().ok_or(RefineError::NoMask)?;

        let (frame_w, frame_h) = image.dimensions();
        let (mask_w, mask_h) = mask.dimensions();
        if (mask_w, mask_h) != (frame_w, frame_h) {
            return Err(RefineError::SizeMismatch {
                mask_w,
                mask_h,
                frame_w,
                frame_h,
            });
        }

        mask_extent(mask).ok_or(RefineError::EmptyMask)
    }
}

impl BoxRefiner for MaskRefiner {
    fn refine(&mut self, frame: &FrameFile, bbox: &BoundingBox) -> Refinement {
        match self.try_refine(frame, bbox) {
            Ok(refined) => {
                info!("Refined window {:?} -> {:?}", bbox, refined);
                Refinement {
                    bbox: refined,
                    outcome: RefineOutcome::Refined,
                }
            }
            Err(e) => {
                warn!("Refinement failed ({}), keeping detector box", e);
                Refinement::pass_through(bbox, e.to_string())
            }
        }
    }
}
