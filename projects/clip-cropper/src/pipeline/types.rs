use crate::video::Backend;
use anyhow::Result;
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension used for every still written to the scratch workspace.
pub const FRAME_EXTENSION: &str = "jpg";

/// One still image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFile {
    pub index: usize,
    pub path: PathBuf,
}

impl FrameFile {
    /// Zero-padded so that lexicographic order equals temporal order.
    pub fn file_name(index: usize) -> String {
        format!("{:09}.{}", index, FRAME_EXTENSION)
    }

    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

/// Ordered stills in one directory.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    pub dir: PathBuf,
    pub frames: Vec<FrameFile>,
}

impl FrameSequence {
    /// List the stills in `dir`, sorted by file name.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut frames = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_frame = entry
                .path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.eq_ignore_ascii_case(FRAME_EXTENSION))
                .unwrap_or(false);
            if is_frame {
                frames.push(FrameFile {
                    index: frames.len(),
                    path: entry.path().to_path_buf(),
                });
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first(&self) -> Option<&FrameFile> {
        self.frames.first()
    }
}

/// Result of the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractedVideo {
    pub frames: FrameSequence,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// Container/codec pair for the re-encoded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VideoCodec {
    /// MPEG-4 Part 2 in an `.mp4` container.
    Mp4v,
    /// Motion JPEG in an `.avi` container.
    Mjpg,
}

impl VideoCodec {
    pub fn fourcc(&self) -> [char; 4] {
        match self {
            VideoCodec::Mp4v => ['m', 'p', '4', 'v'],
            VideoCodec::Mjpg => ['M', 'J', 'P', 'G'],
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VideoCodec::Mp4v => "mp4",
            VideoCodec::Mjpg => "avi",
        }
    }
}

/// Settings for one `process_video` call.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parent of the per-run scratch workspace.
    pub scratch_root: PathBuf,
    /// Stable location the finished video is copied to.
    pub output_dir: PathBuf,
    pub backend: Backend,
    pub codec: VideoCodec,
    /// JPEG quality for extracted and cropped stills (0-100).
    pub jpeg_quality: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
            output_dir: std::env::temp_dir(),
            backend: Backend::Opencv,
            codec: VideoCodec::Mp4v,
            jpeg_quality: 95,
        }
    }
}
