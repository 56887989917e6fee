use super::preprocess::Preprocessor;
use super::types::{Mask, SegmentationModel};
use crate::run_artifacts::BoundingBox;
use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Luma, RgbImage};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};

/// Embedding shape produced by the SAM ViT image encoder.
const EMBEDDING_SHAPE: [usize; 4] = [1, 256, 64, 64];
/// Side of the (unused) low-resolution mask prompt.
const MASK_INPUT_SIZE: usize = 256;
/// Prompt point labels for the top-left and bottom-right box corners.
const BOX_TOP_LEFT_LABEL: f32 = 2.0;
const BOX_BOTTOM_RIGHT_LABEL: f32 = 3.0;

/// Paths of an exported SAM encoder/decoder pair.
#[derive(Debug, Clone)]
pub struct SamConfig {
    pub encoder_path: PathBuf,
    pub decoder_path: PathBuf,
}

/// Segment Anything, run through ONNX Runtime
///
/// Uses the two-model export: a ViT image encoder producing a 64x64
/// embedding, and the prompt decoder that returns mask logits already resized
/// to the original image size.
pub struct SamModel {
    encoder: Session,
    decoder: Session,
    preprocessor: Preprocessor,
}

fn load_session(path: &Path) -> Result<Session> {
    if !path.exists() {
        return Err(anyhow!("Model file not found: {}", path.display()));
    }

    Session::builder()
        .map_err(|e| anyhow!("Failed to create session builder: {}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| anyhow!("Failed to set optimization level: {}", e))?
        .commit_from_file(path)
        .map_err(|e| anyhow!("Failed to load model from {}: {}", path.display(), e))
}

fn tensor(shape: Vec<usize>, data: Vec<f32>) -> Result<Tensor<f32>> {
    Tensor::from_array((shape, data.into_boxed_slice()))
        .map_err(|e| anyhow!("Failed to create tensor: {}", e))
}

impl SamModel {
    pub fn load(config: &SamConfig) -> Result<Self> {
        tracing::info!(
            "Loading SAM encoder from {} and decoder from {}",
            config.encoder_path.display(),
            config.decoder_path.display()
        );

        let encoder = load_session(&config.encoder_path).context("SAM encoder")?;
        let decoder = load_session(&config.decoder_path).context("SAM decoder")?;

        tracing::info!("SAM model loaded successfully");

        Ok(Self {
            encoder,
            decoder,
            preprocessor: Preprocessor::new(),
        })
    }

    fn embed(&mut self, frame: &RgbImage) -> Result<Vec<f32>> {
        let _span = tracing::debug_span!("sam_encoder").entered();

        let side = self.preprocessor.target() as usize;
        let input = tensor(vec![1, 3, side, side], self.preprocessor.preprocess(frame)?)?;

        let outputs = self
            .encoder
            .run(ort::inputs![input])
            .map_err(|e| anyhow!("SAM encoder inference failed: {}", e))?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract image embeddings: {}", e))?;

        let expected: usize = EMBEDDING_SHAPE.iter().product();
        if data.len() != expected {
            return Err(anyhow!(
                "Unexpected embedding size: expected {}, got {}",
                expected,
                data.len()
            ));
        }

        Ok(data.to_vec())
    }
}

/// Box prompt as two corner points in encoder-input coordinates.
fn box_prompt(prompt: &BoundingBox, scale: f32) -> (Vec<f32>, Vec<f32>) {
    let coords = vec![
        prompt.x1 as f32 * scale,
        prompt.y1 as f32 * scale,
        prompt.x2 as f32 * scale,
        prompt.y2 as f32 * scale,
    ];
    let labels = vec![BOX_TOP_LEFT_LABEL, BOX_BOTTOM_RIGHT_LABEL];
    (coords, labels)
}

/// Split `[n, H, W]` logits into binary masks (logit > 0).
fn logits_to_masks(logits: &[f32], width: u32, height: u32) -> Vec<Mask> {
    let plane = width as usize * height as usize;
    if plane == 0 {
        return Vec::new();
    }

    logits
        .chunks_exact(plane)
        .map(|chunk| {
            GrayImage::from_fn(width, height, |x, y| {
                let logit = chunk[y as usize * width as usize + x as usize];
                Luma([if logit > 0.0 { 255 } else { 0 }])
            })
        })
        .collect()
}

impl SegmentationModel for SamModel {
    fn segment(&mut self, frame: &RgbImage, prompt: &BoundingBox) -> Result<Vec<Mask>> {
        let _span = tracing::debug_span!("sam_segment").entered();

        let (width, height) = frame.dimensions();
        let embeddings = self.embed(frame)?;

        let scale = self.preprocessor.scale(width, height);
        let (coords, labels) = box_prompt(prompt, scale);
        let num_points = labels.len();

        let inputs = ort::inputs![
            "image_embeddings" => tensor(EMBEDDING_SHAPE.to_vec(), embeddings)?,
            "point_coords" => tensor(vec![1, num_points, 2], coords)?,
            "point_labels" => tensor(vec![1, num_points], labels)?,
            "mask_input" => tensor(
                vec![1, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE],
                vec![0.0; MASK_INPUT_SIZE * MASK_INPUT_SIZE],
            )?,
            "has_mask_input" => tensor(vec![1], vec![0.0])?,
            "orig_im_size" => tensor(vec![2], vec![height as f32, width as f32])?,
        ];

        let outputs = self
            .decoder
            .run(inputs)
            .map_err(|e| anyhow!("SAM decoder inference failed: {}", e))?;

        let masks = outputs
            .get("masks")
            .ok_or_else(|| anyhow!("Missing masks output"))?;
        let (_, logits) = masks
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract masks: {}", e))?;

        let masks = logits_to_masks(logits, width, height);
        tracing::debug!("SAM returned {} masks", masks.len());
        Ok(masks)
    }
}
