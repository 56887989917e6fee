// Run artifact struct definitions
//
// Boxes and the metadata summary that a run hands back to its caller. All of
// these serialize to the JSON printed by the CLI and written to the sidecar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pixel bounding box within a `frame_width` x `frame_height` frame.
///
/// Always satisfies `0 <= x1 < x2 <= W` and `0 <= y1 < y2 <= H`; the only
/// constructor is [`BoundingBox::new`], which rejects anything else.
/// Deserialization goes through the same check.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "RawBoundingBox")]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    #[serde(rename = "W")]
    pub frame_width: u32,
    #[serde(rename = "H")]
    pub frame_height: u32,
}

impl BoundingBox {
    pub fn new(
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        if x1 < x2 && x2 <= frame_width && y1 < y2 && y2 <= frame_height {
            Some(Self {
                x1,
                y1,
                x2,
                y2,
                frame_width,
                frame_height,
            })
        } else {
            None
        }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Output resolution string, `"<w>x<h>"`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width(), self.height())
    }
}

#[derive(Deserialize)]
struct RawBoundingBox {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    #[serde(rename = "W")]
    frame_width: u32,
    #[serde(rename = "H")]
    frame_height: u32,
}

impl TryFrom<RawBoundingBox> for BoundingBox {
    type Error = String;

    fn try_from(raw: RawBoundingBox) -> Result<Self, Self::Error> {
        BoundingBox::new(raw.x1, raw.y1, raw.x2, raw.y2, raw.frame_width, raw.frame_height).ok_or_else(|| {
            format!(
                "box ({}, {}, {}, {}) is empty or outside a {}x{} frame",
                raw.x1, raw.y1, raw.x2, raw.y2, raw.frame_width, raw.frame_height
            )
        })
    }
}

/// Box as returned by the vision-language service: four integers in a
/// 0..=1000 space. Non-integer answers are rejected at parse time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedBox {
    pub y1: i64,
    pub x1: i64,
    pub y2: i64,
    pub x2: i64,
}

/// How the final box was obtained.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefineOutcome {
    /// Box derived from the first segmentation mask.
    Refined,
    /// Detector box kept unchanged.
    PassThrough { reason: String },
}

/// Summary of one pipeline run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PipelineMetadata {
    /// Frames extracted from the input.
    pub frames: usize,
    /// Frames that made it into the output; lower than `frames` only when
    /// the encoder skipped undecodable stills.
    pub frames_written: usize,
    pub fps: f64,
    pub bbox_detected: BoundingBox,
    pub bbox_refined: BoundingBox,
    pub refinement: RefineOutcome,
    pub resolution: String,
    pub created_at: DateTime<Utc>,
}

impl PipelineMetadata {
    pub fn new(
        frames: usize,
        frames_written: usize,
        fps: f64,
        bbox_detected: BoundingBox,
        bbox_refined: BoundingBox,
        refinement: RefineOutcome,
    ) -> Self {
        Self {
            frames,
            frames_written,
            fps: (fps * 100.0).round() / 100.0,
            bbox_detected,
            bbox_refined,
            refinement,
            resolution: bbox_refined.resolution(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_invariant() {
        assert!(BoundingBox::new(0, 0, 640, 480, 640, 480).is_some());
        assert!(BoundingBox::new(10, 10, 10, 20, 640, 480).is_none());
        assert!(BoundingBox::new(10, 20, 30, 20, 640, 480).is_none());
        assert!(BoundingBox::new(0, 0, 641, 480, 640, 480).is_none());
        assert!(BoundingBox::new(0, 0, 640, 481, 640, 480).is_none());
    }

    #[test]
    fn test_box_serializes_frame_size_as_w_h() {
        let bbox = BoundingBox::new(60, 20, 580, 460, 640, 480).unwrap();
        let json = serde_json::to_value(bbox).unwrap();
        assert_eq!(json["W"], 640);
        assert_eq!(json["H"], 480);
        assert_eq!(bbox.resolution(), "520x440");
    }

    #[test]
    fn test_box_deserialization_enforces_invariant() {
        let bbox: BoundingBox =
            serde_json::from_str(r#"{"x1": 60, "y1": 20, "x2": 580, "y2": 460, "W": 640, "H": 480}"#).unwrap();
        assert_eq!(bbox, BoundingBox::new(60, 20, 580, 460, 640, 480).unwrap());

        for json in [
            r#"{"x1": 60, "y1": 20, "x2": 60, "y2": 460, "W": 640, "H": 480}"#,
            r#"{"x1": 60, "y1": 20, "x2": 700, "y2": 460, "W": 640, "H": 480}"#,
            r#"{"x1": 60, "y1": 470, "x2": 580, "y2": 460, "W": 640, "H": 480}"#,
        ] {
            assert!(serde_json::from_str::<BoundingBox>(json).is_err(), "{json}");
        }
    }

    #[test]
    fn test_normalized_box_requires_integers() {
        let norm: NormalizedBox = serde_json::from_str(r#"{"y1": 50, "x1": 100, "y2": 950, "x2": 900}"#).unwrap();
        assert_eq!((norm.x1, norm.y1, norm.x2, norm.y2), (100, 50, 900, 950));
        assert!(serde_json::from_str::<NormalizedBox>(r#"{"y1": 50, "x1": 100.5, "y2": 950, "x2": 900}"#).is_err());
    }

    #[test]
    fn test_metadata_rounds_fps() {
        let bbox = BoundingBox::new(0, 0, 100, 50, 100, 50).unwrap();
        let meta = PipelineMetadata::new(
            12,
            11,
            29.970029,
            bbox,
            bbox,
            RefineOutcome::PassThrough {
                reason: "disabled".to_string(),
            },
        );
        assert_eq!(meta.fps, 29.97);
        assert_eq!(meta.resolution, "100x50");

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["frames"], 12);
        assert_eq!(json["frames_written"], 11);
        assert_eq!(json["refinement"]["kind"], "pass_through");
        assert_eq!(json["refinement"]["reason"], "disabled");
    }
}
