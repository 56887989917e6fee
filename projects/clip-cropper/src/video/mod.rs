pub mod ffmpeg_reader;
pub mod opencv_reader;
pub mod processor;

use anyhow::Result;
use clap::ValueEnum;
use opencv::core::Mat;
use std::path::Path;

/// Frame rate assumed when the container does not report one.
pub const FALLBACK_FPS: f64 = 30.0;

pub trait VideoReader: Send {
    /// Frame count reported by the container. May be an estimate, or zero.
    fn frame_count(&self) -> Result<usize>;
    fn source_fps(&self) -> Result<f64>;
    /// Next decoded BGR frame, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

/// Decoder used for frame extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Opencv,
    Ffmpeg,
}

pub fn open_reader(path: &Path, backend: Backend) -> Result<Box<dyn VideoReader>> {
    let reader: Box<dyn VideoReader> = match backend {
        Backend::Opencv => Box::new(opencv_reader::OpencvReader::new(path)?),
        Backend::Ffmpeg => Box::new(ffmpeg_reader::FfmpegReader::new(path)?),
    };
    Ok(reader)
}
