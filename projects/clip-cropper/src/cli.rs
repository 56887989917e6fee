use crate::pipeline::detection::{GeminiConfig, DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL};
use crate::pipeline::types::{PipelineConfig, VideoCodec};
use crate::segmentation::SamConfig;
use crate::video::Backend;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Crop a video to the clip window embedded in its frames", long_about = None)]
pub struct Args {
    /// Input video file
    pub input: PathBuf,

    /// Directory the cropped video is published to (default: system temp dir)
    #[arg(long, env = "CLIP_CROPPER_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Parent directory for per-run scratch workspaces (default: system temp dir)
    #[arg(long, env = "CLIP_CROPPER_SCRATCH_ROOT")]
    pub scratch_root: Option<PathBuf>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Gemini model used for window detection
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,

    /// Sampling temperature for the detection request
    #[arg(long, env = "GEMINI_TEMPERATURE", default_value_t = 0.1)]
    pub temperature: f32,

    /// Base URL of the Gemini API
    #[arg(long, env = "GEMINI_ENDPOINT", default_value = DEFAULT_GEMINI_ENDPOINT)]
    pub gemini_endpoint: String,

    /// Detection request timeout in seconds
    #[arg(long, env = "GEMINI_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,

    /// SAM image encoder (ONNX)
    #[arg(long, env = "SAM_ENCODER_MODEL", default_value = "models/sam_encoder.onnx")]
    pub sam_encoder: PathBuf,

    /// SAM prompt decoder (ONNX)
    #[arg(long, env = "SAM_DECODER_MODEL", default_value = "models/sam_decoder.onnx")]
    pub sam_decoder: PathBuf,

    /// Skip segmentation and crop to the detected window as is
    #[arg(long, env = "CLIP_CROPPER_NO_REFINE")]
    pub no_refine: bool,

    /// Decoder used for frame extraction
    #[arg(long, value_enum, env = "CLIP_CROPPER_BACKEND", default_value = "opencv")]
    pub backend: Backend,

    /// Output codec
    #[arg(long, value_enum, env = "CLIP_CROPPER_CODEC", default_value = "mp4v")]
    pub codec: VideoCodec,

    /// JPEG quality for intermediate stills
    #[arg(long, env = "CLIP_CROPPER_JPEG_QUALITY", default_value_t = 95, value_parser = clap::value_parser!(i32).range(1..=100))]
    pub jpeg_quality: i32,

    /// Also write the run metadata as JSON to this file
    #[arg(long)]
    pub metadata_out: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            scratch_root: self.scratch_root.clone().unwrap_or(defaults.scratch_root),
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
            backend: self.backend,
            codec: self.codec,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            model: self.gemini_model.clone(),
            temperature: self.temperature,
            endpoint: self.gemini_endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            ..GeminiConfig::new(self.api_key.clone())
        }
    }

    pub fn sam_config(&self) -> SamConfig {
        SamConfig {
            encoder_path: self.sam_encoder.clone(),
            decoder_path: self.sam_decoder.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_map_to_configs() {
        let args = Args::try_parse_from([
            "clip-cropper",
            "in.mp4",
            "--api-key",
            "k",
            "--output-dir",
            "/tmp/out",
            "--codec",
            "mjpg",
            "--backend",
            "ffmpeg",
            "--timeout-secs",
            "5",
        ])
        .unwrap();

        let pipeline = args.pipeline_config();
        assert_eq!(pipeline.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(pipeline.codec, VideoCodec::Mjpg);
        assert_eq!(pipeline.backend, Backend::Ffmpeg);
        assert_eq!(pipeline.jpeg_quality, 95);

        let gemini = args.gemini_config();
        assert_eq!(gemini.api_key, "k");
        assert_eq!(gemini.timeout, Duration::from_secs(5));
        assert!((gemini.temperature - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_jpeg_quality_is_range_checked() {
        let result = Args::try_parse_from(["clip-cropper", "in.mp4", "--api-key", "k", "--jpeg-quality", "0"]);
        assert!(result.is_err());
    }
}
