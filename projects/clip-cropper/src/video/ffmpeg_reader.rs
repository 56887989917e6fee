use super::{VideoReader, FALLBACK_FPS};
use anyhow::{anyhow, Context, Result};
use opencv::{core, prelude::*};
use std::path::Path;

use ffmpeg_next::ffi;

/// Video reader backed by FFmpeg via ffmpeg-next, decoding on the CPU and
/// converting every frame to BGR24.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Lazily created on first frame (source format is only known then).
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    width: u32,
    height: u32,
    source_fps: f64,
    total_frames: usize,
    packet: ffmpeg_next::codec::packet::Packet,
    eof_sent: bool,
}

// SAFETY: a reader is owned by exactly one extraction loop at a time; the raw
// pointers inside ffmpeg-next types are never shared.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !path.exists() {
            return Err(anyhow!("Video file not found: {}", path.display()));
        }

        let input_ctx = ffmpeg_next::format::input(&path).context("Failed to open video file")?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {}", path.display()))?;

        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let source_fps = if rational_fps.denominator() > 0 && rational_fps.numerator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            tracing::warn!(
                "FfmpegReader: could not determine FPS, defaulting to {}",
                FALLBACK_FPS
            );
            FALLBACK_FPS
        };

        let stream_frames = video_stream.frames().max(0) as usize;
        let duration_secs = input_ctx.duration().max(0) as f64 / ffi::AV_TIME_BASE as f64;
        let total_frames = if stream_frames == 0 {
            (duration_secs * source_fps).round() as usize
        } else {
            stream_frames
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        let width = decoder.width();
        let height = decoder.height();

        tracing::info!(
            "FfmpegReader: opened {}, {}x{}, duration={:.2}s, fps={:.2}, estimated_frames={}",
            path.display(),
            width,
            height,
            duration_secs,
            source_fps,
            total_frames
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            width,
            height,
            source_fps,
            total_frames,
            packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Pull the next decoded frame, feeding packets as needed.
    /// Returns `Ok(false)` once the decoder is fully drained.
    fn decode_next(&mut self, target: &mut ffmpeg_next::util::frame::Video) -> Result<bool> {
        loop {
            match self.decoder.receive_frame(target) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(false);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            let mut found_packet = false;
            while self.packet.read(&mut self.input_ctx).is_ok() {
                if self.packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                // Input exhausted: flush the decoder, then drain what is left.
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn to_bgr(
        &mut self,
        frame: &ffmpeg_next::util::frame::Video,
    ) -> Result<ffmpeg_next::util::frame::Video> {
        if self.scaler.is_none() {
            let scaler = ffmpeg_next::software::scaling::Context::get(
                frame.format(),
                self.width,
                self.height,
                ffmpeg_next::format::Pixel::BGR24,
                self.width,
                self.height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("Scaler not initialized"))?;
        let mut bgr = ffmpeg_next::util::frame::Video::empty();
        scaler.run(frame, &mut bgr).context("Scaler failed")?;
        Ok(bgr)
    }
}

/// Deep-copy a BGR24 ffmpeg frame into an owned OpenCV Mat, honouring the
/// source row stride.
fn bgr_frame_to_mat(frame: &ffmpeg_next::util::frame::Video) -> Result<core::Mat> {
    let width = frame.width() as i32;
    let height = frame.height() as i32;
    let data = frame.data(0);
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;

    let mut mat = unsafe { core::Mat::new_rows_cols(height, width, core::CV_8UC3)? };

    for y in 0..height as usize {
        let src_offset = y * stride;
        let src_row = &data[src_offset..src_offset + row_bytes];
        let dst_ptr = mat.ptr_mut(y as i32)?;
        unsafe {
            std::ptr::copy_nonoverlapping(src_row.as_ptr(), dst_ptr, row_bytes);
        }
    }

    Ok(mat)
}

impl VideoReader for FfmpegReader {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn next_frame(&mut self) -> Result<Option<core::Mat>> {
        let mut raw = ffmpeg_next::util::frame::Video::empty();
        if !self.decode_next(&mut raw)? {
            return Ok(None);
        }
        let bgr = self.to_bgr(&raw)?;
        Ok(Some(bgr_frame_to_mat(&bgr)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{backdrop_green, write_test_video};

    #[test]
    fn test_missing_file_is_rejected_before_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegReader::new(&dir.path().join("missing.mp4"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_decodes_every_frame_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.avi");
        write_test_video(&path, 8, 25.0, 64, 48).unwrap();

        let mut reader = FfmpegReader::new(&path).unwrap();
        assert!((reader.source_fps().unwrap() - 25.0).abs() < 0.01);

        let mut greens = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            let size = frame.size().unwrap();
            assert_eq!((size.width, size.height), (64, 48));
            greens.push(frame.at_2d::<core::Vec3b>(0, 0).unwrap()[1] as f64);
        }

        assert_eq!(greens.len(), 8);
        assert!(greens.windows(2).all(|w| w[1] > w[0]), "{greens:?}");
        assert!((greens[0] - backdrop_green(0)).abs() < 20.0, "{greens:?}");
        assert!(reader.next_frame().unwrap().is_none());
    }
}
