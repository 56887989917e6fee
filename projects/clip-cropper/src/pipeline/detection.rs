//! Window detection via a vision-language model.
//!
//! The detector sends the first frame to Gemini with a fixed instruction and
//! turns the returned 0..=1000 box into padded, clamped pixel coordinates.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::geometry::{to_pixel_box, WINDOW_PAD};
use crate::pipeline::types::FrameFile;
use crate::run_artifacts::{BoundingBox, NormalizedBox};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Fixed instruction sent with every frame.
pub const WINDOW_PROMPT: &str = "This frame is a graphic design with a decorative background \
and a central window or panel where a video clip is embedded. Detect the exact bounds of \
that window and return ONLY JSON: {\"y1\": int, \"x1\": int, \"y2\": int, \"x2\": int}. \
Values are normalized from 0 to 1000. Only the JSON, nothing else.";

/// Locates the embedded clip window in a still frame.
pub trait WindowDetector {
    fn detect(&self, frame: &FrameFile) -> PipelineResult<BoundingBox>;
}

/// Read the true pixel size of a still on disk.
pub fn frame_dimensions(frame: &FrameFile) -> PipelineResult<(u32, u32)> {
    image::image_dimensions(&frame.path).map_err(|e| {
        PipelineError::media_read(format!(
            "Failed to read dimensions of {}: {}",
            frame.path.display(),
            e
        ))
    })
}

/// Convert a service box to pixels against the frame's real size.
pub fn resolve_window(norm: &NormalizedBox, width: u32, height: u32) -> PipelineResult<BoundingBox> {
    to_pixel_box(norm, width, height, WINDOW_PAD).ok_or_else(|| {
        PipelineError::detection_parse(format!(
            "Window {:?} has no area in a {}x{} frame",
            norm, width, height
        ))
    })
}

/// Connection settings for the Gemini API. The key is passed in explicitly;
/// nothing is read from the process environment here.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub endpoint: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            temperature: 0.1,
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    InlineData(InlineData),
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini-backed [`WindowDetector`].
pub struct GeminiDetector {
    config: GeminiConfig,
    client: Client,
}

impl GeminiDetector {
    pub fn new(config: GeminiConfig) -> PipelineResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::detection_service(
                "Gemini API key is required",
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                PipelineError::detection_service(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Send the image and return the model's raw text answer.
    fn request_window(&self, jpeg: &[u8]) -> PipelineResult<String> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData(InlineData {
                        mime_type: "image/jpeg".to_string(),
                        data: STANDARD.encode(jpeg),
                    }),
                    Part::Text(WINDOW_PROMPT.to_string()),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: self.config.temperature,
            },
        };

        info!("Requesting window bounds from {}", self.config.model);

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::detection_service(format!("Gemini API request timed out: {}", e))
                } else {
                    PipelineError::detection_service(format!("Gemini API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            return Err(PipelineError::detection_service(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().map_err(|e| {
            PipelineError::detection_service(format!("Failed to decode Gemini response: {}", e))
        })?;

        gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| PipelineError::detection_parse("No content in Gemini response"))
    }
}

impl WindowDetector for GeminiDetector {
    fn detect(&self, frame: &FrameFile) -> PipelineResult<BoundingBox> {
        let (width, height) = frame_dimensions(frame)?;
        let jpeg = std::fs::read(&frame.path).map_err(|e| {
            PipelineError::media_read(format!("Failed to read {}: {}", frame.path.display(), e))
        })?;

        let text = self.request_window(&jpeg)?;
        debug!("Gemini answered: {}", text);

        let norm = parse_window_response(&text)?;
        let bbox = resolve_window(&norm, width, height)?;
        info!("Window detected at {:?} (normalized {:?})", bbox, norm);
        Ok(bbox)
    }
}

/// Parse the model's answer, tolerating a markdown code fence around it.
pub fn parse_window_response(text: &str) -> PipelineResult<NormalizedBox> {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    serde_json::from_str(text.trim()).map_err(|e| {
        PipelineError::detection_parse(format!("Failed to parse window JSON {:?}: {}", text, e))
    })
}
