use crate::{PlayerError, Result, DEFAULT_FRAME_RATE};
use ffmpeg_next as ffmpeg;
use image::{GrayImage, RgbImage};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pixel data of a decoded frame
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    /// Three channels, R G B
    Rgb(RgbImage),
    /// Single luminance channel
    Gray(GrayImage),
}

/// One decoded image from a video source
#[derive(Debug, Clone)]
pub struct RasterFrame {
    pub pixels: PixelBuffer,
    /// Timestamp in seconds
    pub timestamp: f64,
}

impl RasterFrame {
    /// Build a color frame from packed RGB24 bytes
    pub fn rgb(width: u32, height: u32, data: Vec<u8>, timestamp: f64) -> Result<Self> {
        let image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            PlayerError::DecodeFailure(format!("RGB buffer does not fit {}x{}", width, height))
        })?;
        Ok(Self {
            pixels: PixelBuffer::Rgb(image),
            timestamp,
        })
    }

    /// Build a grayscale frame from one byte per pixel
    pub fn gray(width: u32, height: u32, data: Vec<u8>, timestamp: f64) -> Result<Self> {
        let image = GrayImage::from_raw(width, height, data).ok_or_else(|| {
            PlayerError::DecodeFailure(format!("gray buffer does not fit {}x{}", width, height))
        })?;
        Ok(Self {
            pixels: PixelBuffer::Gray(image),
            timestamp,
        })
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        match &self.pixels {
            PixelBuffer::Rgb(image) => image.width(),
            PixelBuffer::Gray(image) => image.width(),
        }
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        match &self.pixels {
            PixelBuffer::Rgb(image) => image.height(),
            PixelBuffer::Gray(image) => image.height(),
        }
    }

    /// Whether the frame carries color channels
    pub fn is_color(&self) -> bool {
        matches!(self.pixels, PixelBuffer::Rgb(_))
    }
}

/// Stream-level facts reported by a source when it is opened
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Frames per second as reported; may be zero when unknown
    pub frame_rate: f64,
    /// Total number of frames; zero when unknown
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// Duration in seconds, `frame_count / frame_rate`
    pub fn duration(&self) -> f64 {
        let rate = crate::utils::effective_frame_rate(self.frame_rate, DEFAULT_FRAME_RATE);
        self.frame_count as f64 / rate
    }
}

/// A source of decoded frames, exclusively owned by whoever plays it
pub trait VideoSource {
    fn metadata(&self) -> VideoMetadata;

    /// Pull the next frame; `Ok(None)` marks the end of the stream
    fn next_frame(&mut self) -> Result<Option<RasterFrame>>;

    /// Reposition so the next pulled frame is `frame_index`
    fn seek(&mut self, frame_index: u64) -> Result<()>;

    /// Release the underlying handle. Called once on every exit path.
    fn close(&mut self) {}
}

/// Video source backed by FFmpeg
pub struct FfmpegSource {
    path: PathBuf,
    input_context: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    metadata: VideoMetadata,
    time_base: f64,
    /// Presentation time of the first frame, in seconds
    start_time: f64,
    frames_decoded: u64,
    eof_sent: bool,
    /// Frame index a pending seek must reach before frames are handed out
    seek_target: Option<u64>,
    /// Whether decoded frames have carried presentation timestamps
    has_timestamps: bool,
}

/// What to do with a decoded frame while a seek is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekStep {
    /// Frame lies before the target, decode on
    Discard,
    /// Deliver this frame as the given index
    Deliver(u64),
}

/// Decide whether a frame decoded after a container seek is the target.
///
/// Container seeks land on the keyframe at or before the target, so frames
/// are dropped until the target index is reached. Frames without a usable
/// timestamp are counted instead, `counted` being the frames seen so far.
fn seek_step(target: u64, frame_index: Option<u64>, counted: u64) -> SeekStep {
    let index = frame_index.unwrap_or(counted);
    if index < target {
        SeekStep::Discard
    } else {
        SeekStep::Deliver(index)
    }
}

impl FfmpegSource {
    /// Open a video file and read its stream metadata
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlayerError::NotFound(path.to_path_buf()));
        }

        let unavailable = |reason: String| PlayerError::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        match ffmpeg::init() {
            Ok(_) => debug!("FFmpeg initialized successfully"),
            Err(e) => debug!("FFmpeg init error: {:?}", e),
        }

        debug!("Attempting to open video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path).map_err(|e| unavailable(e.to_string()))?;

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| unavailable("no video stream found".to_string()))?;
        let stream_index = stream.index();

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| unavailable(format!("failed to create codec context: {}", e)))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| unavailable(format!("failed to create video decoder: {}", e)))?;

        let rate = stream.avg_frame_rate();
        let frame_rate = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        let time_base = stream.time_base();
        let time_base = if time_base.denominator() != 0 {
            time_base.numerator() as f64 / time_base.denominator() as f64
        } else {
            0.0
        };

        let start_time = match stream.start_time() {
            ts if ts != ffmpeg::ffi::AV_NOPTS_VALUE && ts > 0 => ts as f64 * time_base,
            _ => 0.0,
        };

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            estimate_frame_count(&input_context, stream.duration(), time_base, frame_rate)
        };

        let metadata = VideoMetadata {
            frame_rate,
            frame_count,
            width: decoder.width(),
            height: decoder.height(),
        };

        info!(
            "Opened video stream {} in '{}': {}x{}, {:.2} FPS, {} frames",
            stream_index,
            path.display(),
            metadata.width,
            metadata.height,
            metadata.frame_rate,
            metadata.frame_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            input_context,
            stream_index,
            decoder,
            scaler: None,
            metadata,
            time_base,
            start_time,
            frames_decoded: 0,
            eof_sent: false,
            seek_target: None,
            has_timestamps: false,
        })
    }

    /// Get the path this source was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame index implied by a decoded frame's presentation timestamp
    fn frame_index_of(&self, frame: &ffmpeg::frame::Video) -> Option<u64> {
        let rate = crate::utils::effective_frame_rate(self.metadata.frame_rate, DEFAULT_FRAME_RATE);
        match frame.timestamp() {
            Some(ts) if ts != ffmpeg::ffi::AV_NOPTS_VALUE && self.time_base > 0.0 => {
                let index = ((ts as f64 * self.time_base - self.start_time) * rate).round();
                Some(index.max(0.0) as u64)
            }
            _ => None,
        }
    }

    /// Convert a decoded FFmpeg frame into a packed RGB raster frame
    fn extract_frame(&mut self, frame: &ffmpeg::frame::Video) -> Result<RasterFrame> {
        let width = frame.width();
        let height = frame.height();

        if self.scaler.is_none() {
            self.scaler = Some(
                ffmpeg::software::scaling::Context::get(
                    frame.format(),
                    width,
                    height,
                    ffmpeg::format::Pixel::RGB24,
                    width,
                    height,
                    ffmpeg::software::scaling::Flags::BILINEAR,
                )
                .map_err(|e| {
                    PlayerError::DecodeFailure(format!("failed to create scaling context: {}", e))
                })?,
            );
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some(ref mut scaler) = self.scaler {
            scaler
                .run(frame, &mut rgb_frame)
                .map_err(|e| PlayerError::DecodeFailure(format!("failed to scale frame: {}", e)))?;
        }

        let timestamp = match frame.timestamp() {
            Some(ts) if ts != ffmpeg::ffi::AV_NOPTS_VALUE && self.time_base > 0.0 => {
                ts as f64 * self.time_base
            }
            _ => {
                let rate =
                    crate::utils::effective_frame_rate(self.metadata.frame_rate, DEFAULT_FRAME_RATE);
                self.frames_decoded as f64 / rate
            }
        };

        // Rows are padded to the stride, copy only the visible bytes
        let stride = rgb_frame.stride(0);
        let row_bytes = width as usize * 3;
        let plane = rgb_frame.data(0);
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            if end > plane.len() {
                return Err(PlayerError::DecodeFailure(format!(
                    "frame plane truncated at row {}",
                    row
                )));
            }
            data.extend_from_slice(&plane[start..end]);
        }

        self.frames_decoded += 1;
        debug!(
            "Decoded frame {}: {}x{}, timestamp: {:.3}s",
            self.frames_decoded, width, height, timestamp
        );

        RasterFrame::rgb(width, height, data, timestamp)
    }
}

impl VideoSource for FfmpegSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let index = self.frame_index_of(&decoded);
                    self.has_timestamps |= index.is_some();
                    if let Some(target) = self.seek_target {
                        match seek_step(target, index, self.frames_decoded) {
                            SeekStep::Discard => {
                                self.frames_decoded = index.unwrap_or(self.frames_decoded) + 1;
                                continue;
                            }
                            SeekStep::Deliver(landed) => {
                                debug!("Seek reached frame {} (target {})", landed, target);
                                self.frames_decoded = landed;
                                self.seek_target = None;
                            }
                        }
                    }
                    return self.extract_frame(&decoded).map(Some);
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => {
                    return Err(PlayerError::DecodeFailure(format!(
                        "failed to receive frame from decoder: {}",
                        e
                    )))
                }
            }

            if self.eof_sent {
                return Ok(None);
            }

            let stream_index = self.stream_index;
            let packet = self
                .input_context
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);

            match packet {
                Some(packet) => self.decoder.send_packet(&packet).map_err(|e| {
                    PlayerError::DecodeFailure(format!("failed to send packet to decoder: {}", e))
                })?,
                None => {
                    self.decoder.send_eof().map_err(|e| {
                        PlayerError::DecodeFailure(format!("failed to send EOF to decoder: {}", e))
                    })?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        let rate = crate::utils::effective_frame_rate(self.metadata.frame_rate, DEFAULT_FRAME_RATE);
        let seconds = frame_index as f64 / rate;
        // Counting frames is only exact from the very start of the stream
        let position = if self.has_timestamps {
            ((self.start_time + seconds) * ffmpeg::ffi::AV_TIME_BASE as f64) as i64
        } else {
            0
        };

        self.input_context
            .seek(position, ..position)
            .map_err(|e| {
                PlayerError::DecodeFailure(format!("failed to seek to frame {}: {}", frame_index, e))
            })?;

        // Reset decoder state; next_frame decodes forward from the keyframe
        self.decoder.flush();
        self.eof_sent = false;
        self.frames_decoded = 0;
        self.seek_target = if frame_index > 0 { Some(frame_index) } else { None };

        debug!("Seeked to frame {} ({:.2}s)", frame_index, seconds);
        Ok(())
    }

    fn close(&mut self) {
        self.scaler = None;
        debug!("Closed video source '{}'", self.path.display());
    }
}

/// Derive a frame count from the stream or container duration when the
/// stream header does not carry one
fn estimate_frame_count(
    input_context: &ffmpeg::format::context::Input,
    stream_duration: i64,
    time_base: f64,
    frame_rate: f64,
) -> u64 {
    if frame_rate <= 0.0 {
        return 0;
    }

    let seconds = if stream_duration != ffmpeg::ffi::AV_NOPTS_VALUE && stream_duration > 0 {
        stream_duration as f64 * time_base
    } else if input_context.duration() > 0 {
        input_context.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
    } else {
        0.0
    };

    (seconds * frame_rate).round() as u64
}
