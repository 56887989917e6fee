// Encode stage: reassembles cropped stills into a video container.

use crate::error::{chain, PipelineError, PipelineResult};
use crate::pipeline::types::{FrameSequence, VideoCodec};
use crate::video::processor::frame_progress;
use anyhow::{anyhow, Result};
use opencv::prelude::*;
use opencv::{core, imgcodecs, videoio};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

fn open_writer(output: &Path, codec: VideoCodec, fps: f64, size: core::Size) -> Result<videoio::VideoWriter> {
    let path_str = output
        .to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {:?}", output))?;
    let [a, b, c, d] = codec.fourcc();
    let fourcc = videoio::VideoWriter::fourcc(a, b, c, d)?;

    let writer = videoio::VideoWriter::new(path_str, fourcc, fps, size, true)?;
    if !writer.is_opened()? {
        return Err(anyhow!(
            "Could not open {} for writing with codec {:?}",
            path_str,
            codec
        ));
    }
    Ok(writer)
}

/// Encode the stills in `frames_dir` (in file name order) at `fps` into
/// `output`. Stills that fail to decode, or whose size differs from
/// `(width, height)`, are skipped with a warning. Returns the number of
/// frames written.
pub fn encode_frames(
    frames_dir: &Path,
    fps: f64,
    (width, height): (u32, u32),
    codec: VideoCodec,
    output: &Path,
) -> PipelineResult<usize> {
    let start = Instant::now();
    let frames = FrameSequence::scan(frames_dir).map_err(|e| PipelineError::workspace(chain(&e)))?;
    let size = core::Size::new(width as i32, height as i32);

    let mut writer = open_writer(output, codec, fps, size).map_err(|e| PipelineError::encode(chain(&e)))?;
    let pb = frame_progress(frames.len(), "encode").map_err(|e| PipelineError::encode(chain(&e)))?;

    let mut written = 0;
    for frame in &frames.frames {
        pb.inc(1);
        let Some(path_str) = frame.path.to_str() else {
            warn!("Skipping frame with non UTF-8 path {:?}", frame.path);
            continue;
        };
        let mat = match imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR) {
            Ok(mat) if !mat.empty() => mat,
            Ok(_) => {
                warn!("Skipping undecodable frame {}", frame.name());
                continue;
            }
            Err(e) => {
                warn!("Skipping frame {}: {}", frame.name(), e);
                continue;
            }
        };
        match mat.size() {
            Ok(s) if s == size => {}
            _ => {
                warn!("Skipping frame {} with unexpected size", frame.name());
                continue;
            }
        }

        writer
            .write(&mat)
            .map_err(|e| PipelineError::encode(format!("Failed to write frame {}: {}", frame.name(), e)))?;
        written += 1;
    }
    pb.finish_and_clear();

    writer
        .release()
        .map_err(|e| PipelineError::encode(format!("Failed to finalize {}: {}", output.display(), e)))?;

    if written == 0 {
        return Err(PipelineError::encode(format!(
            "No frames could be written to {}",
            output.display()
        )));
    }

    info!(
        "Encoded {}/{} frames at {:.2} fps into {} in {:.2}s",
        written,
        frames.len(),
        fps,
        output.display(),
        start.elapsed().as_secs_f64()
    );

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::FrameFile;
    use crate::test_support::write_test_jpeg;
    use crate::video::opencv_reader::OpencvReader;
    use crate::video::VideoReader;
    use std::fs;

    #[test]
    fn test_encodes_frames_and_skips_corrupt_ones() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("cropped");
        fs::create_dir(&frames_dir).unwrap();
        for i in 0..5 {
            write_test_jpeg(&frames_dir.join(FrameFile::file_name(i)), 64, 48).unwrap();
        }
        fs::write(frames_dir.join(FrameFile::file_name(2)), b"not a jpeg").unwrap();

        let output = dir.path().join("output.avi");
        let written = encode_frames(&frames_dir, 25.0, (64, 48), VideoCodec::Mjpg, &output).unwrap();
        assert_eq!(written, 4);

        let reader = OpencvReader::new(&output).unwrap();
        assert_eq!(reader.frame_count().unwrap(), 4);
        assert!((reader.source_fps().unwrap() - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_encodes_default_mp4v_container() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("cropped");
        fs::create_dir(&frames_dir).unwrap();
        for i in 0..6 {
            write_test_jpeg(&frames_dir.join(FrameFile::file_name(i)), 64, 48).unwrap();
        }

        let output = dir.path().join("output.mp4");
        let written = encode_frames(&frames_dir, 30.0, (64, 48), VideoCodec::Mp4v, &output).unwrap();
        assert_eq!(written, 6);

        let mut reader = OpencvReader::new(&output).unwrap();
        assert_eq!(reader.frame_count().unwrap(), 6);
        assert!((reader.source_fps().unwrap() - 30.0).abs() < 0.01);

        let mut decoded = 0;
        while let Some(frame) = reader.next_frame().unwrap() {
            let size = frame.size().unwrap();
            assert_eq!((size.width, size.height), (64, 48));
            decoded += 1;
        }
        assert_eq!(decoded, 6);
    }

    #[test]
    fn test_unwritable_output_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("cropped");
        fs::create_dir(&frames_dir).unwrap();
        write_test_jpeg(&frames_dir.join(FrameFile::file_name(0)), 64, 48).unwrap();

        let output = dir.path().join("missing-dir").join("output.avi");
        let err = encode_frames(&frames_dir, 25.0, (64, 48), VideoCodec::Mjpg, &output).unwrap_err();
        assert!(matches!(err, PipelineError::Encode(_)), "{err:?}");
    }

    #[test]
    fn test_nothing_decodable_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("cropped");
        fs::create_dir(&frames_dir).unwrap();
        fs::write(frames_dir.join(FrameFile::file_name(0)), b"garbage").unwrap();

        let output = dir.path().join("output.avi");
        let err = encode_frames(&frames_dir, 25.0, (64, 48), VideoCodec::Mjpg, &output).unwrap_err();
        assert!(matches!(err, PipelineError::Encode(_)), "{err:?}");
    }
}
