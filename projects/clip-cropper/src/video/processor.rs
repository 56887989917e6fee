use crate::video::{open_reader, Backend, VideoReader};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use opencv::core::Mat;
use std::path::Path;
use std::time::{Duration, Instant};

pub struct ProcessingStats {
    pub processed_frames: usize,
    pub source_fps: f64,
    pub duration: Duration,
}

/// A trait for handling video frames. This separates the "how to process"
/// from the "how to read and orchestrate" logic.
pub trait FrameProcessor {
    fn process(&mut self, index: usize, frame: Mat) -> Result<()>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameProcessor.
impl<F> FrameProcessor for F
where
    F: FnMut(usize, Mat) -> Result<()>,
{
    fn process(&mut self, index: usize, frame: Mat) -> Result<()> {
        self(index, frame)
    }
}

/// Progress bar for a per-frame loop. `total == 0` means the length is
/// unknown, in which case a spinner is shown instead.
pub fn frame_progress(total: usize, label: &str) -> Result<ProgressBar> {
    if total == 0 {
        let pb = ProgressBar::new_spinner();
        pb.set_message(label.to_string());
        return Ok(pb);
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
            .progress_chars("#>-"),
    );
    pb.set_message(label.to_string());
    Ok(pb)
}

pub struct VideoSession {
    pub reader: Box<dyn VideoReader>,
    pub pb: ProgressBar,
    pub start_time: Instant,
    pub processed_frames: usize,
}

impl VideoSession {
    pub fn new(video_path: &Path, backend: Backend) -> Result<Self> {
        let reader = open_reader(video_path, backend)?;
        let pb = frame_progress(reader.frame_count()?, "extract")?;

        Ok(Self {
            reader,
            pb,
            start_time: Instant::now(),
            processed_frames: 0,
        })
    }
}

/// Decode every frame of `video_path` in order and hand it to `processor`.
pub fn for_each_frame<P>(video_path: &Path, backend: Backend, mut processor: P) -> Result<ProcessingStats>
where
    P: FrameProcessor,
{
    let mut session = VideoSession::new(video_path, backend)?;
    let source_fps = session.reader.source_fps()?;

    while let Some(frame) = session.reader.next_frame()? {
        processor.process(session.processed_frames, frame)?;
        session.processed_frames += 1;
        session.pb.inc(1);
    }

    session.pb.finish_and_clear();

    Ok(ProcessingStats {
        processed_frames: session.processed_frames,
        source_fps,
        duration: session.start_time.elapsed(),
    })
}
