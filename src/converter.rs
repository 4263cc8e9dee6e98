use crate::decoder::{PixelBuffer, RasterFrame};
use crate::dimensions::DimensionResolver;
use crate::ramp::{GlyphRamp, RampPreset};
use crate::{PlayerError, Result, DEFAULT_FRAME_RATE};
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::Command;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Character-art rendering of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    /// Row-major text, rows joined by `\n`. Color escapes are zero-width.
    pub content: String,
    /// Grid width in glyphs
    pub width: u32,
    /// Grid height in glyphs
    pub height: u32,
    /// Timestamp in seconds
    pub timestamp: f64,
}

/// Settings for one playback session, fixed once validated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Glyph ramp, darkest bucket first
    pub chars: String,
    /// Explicit output width in glyphs
    pub width: Option<u32>,
    /// Explicit output height in glyphs
    pub height: Option<u32>,
    /// Forced width/height ratio of the picture
    pub aspect_ratio: Option<f64>,
    /// Reverse the ramp
    pub invert: bool,
    /// Emit 24-bit foreground color per glyph
    pub color: bool,
    /// Restart from the first frame at end of stream
    pub loop_playback: bool,
    /// Reserve the last terminal row for a status line
    pub show_status: bool,
    /// Frame rate used when the source reports none
    pub fallback_fps: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chars: RampPreset::default().chars().to_string(),
            width: None,
            height: None,
            aspect_ratio: None,
            invert: false,
            color: false,
            loop_playback: false,
            show_status: true,
            fallback_fps: DEFAULT_FRAME_RATE,
        }
    }
}

impl PlaybackConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlayerError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field; the config is read-only after this passes
    pub fn validate(&self) -> Result<()> {
        if self.chars.is_empty() {
            return Err(PlayerError::InvalidConfig(
                "glyph ramp must contain at least one character".to_string(),
            ));
        }
        if self.width == Some(0) {
            return Err(PlayerError::InvalidConfig(
                "width must be greater than 0".to_string(),
            ));
        }
        if self.height == Some(0) {
            return Err(PlayerError::InvalidConfig(
                "height must be greater than 0".to_string(),
            ));
        }
        if let Some(ratio) = self.aspect_ratio {
            if !(ratio.is_finite() && ratio > 0.0) {
                return Err(PlayerError::InvalidConfig(format!(
                    "aspect ratio must be positive, got {}",
                    ratio
                )));
            }
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            return Err(PlayerError::InvalidConfig(
                "fallback frame rate must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective ramp with inversion applied
    pub fn ramp(&self) -> Result<GlyphRamp> {
        GlyphRamp::new(&self.chars, self.invert)
    }

    /// Dimension resolver built from the size and aspect settings
    pub fn resolver(&self) -> DimensionResolver {
        DimensionResolver::new(self.width, self.height, self.aspect_ratio)
    }
}

/// Raster frame to character-art converter
#[derive(Debug, Clone)]
pub struct FrameConverter {
    ramp: GlyphRamp,
    resolver: DimensionResolver,
    color: bool,
}

impl FrameConverter {
    /// Create a new frame converter with the given configuration
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        Ok(Self {
            ramp: config.ramp()?,
            resolver: config.resolver(),
            color: config.color,
        })
    }

    /// Get the effective glyph ramp
    pub fn ramp(&self) -> &GlyphRamp {
        &self.ramp
    }

    /// Convert a raster frame to a glyph grid fitted to the given terminal
    /// bounds (already excluding any reserved status row)
    pub fn convert(
        &self,
        frame: &RasterFrame,
        terminal_width: u32,
        terminal_height: u32,
    ) -> Result<RenderedFrame> {
        if self.ramp.is_empty() {
            return Err(PlayerError::InvalidConfig(
                "glyph ramp must contain at least one character".to_string(),
            ));
        }

        let (src_width, src_height) = (frame.width(), frame.height());
        if src_width == 0 || src_height == 0 {
            return Err(PlayerError::DecodeFailure(format!(
                "frame has no pixels ({}x{})",
                src_width, src_height
            )));
        }

        let (width, height) =
            self.resolver
                .resolve(src_width, src_height, terminal_width, terminal_height);

        let (brightness, colors) = match &frame.pixels {
            PixelBuffer::Gray(image) => (
                area_resample(image.as_raw(), src_width, src_height, 1, width, height),
                None,
            ),
            PixelBuffer::Rgb(image) => {
                let luma: Vec<u8> = image
                    .pixels()
                    .map(|p| calculate_luminance(p[0], p[1], p[2]))
                    .collect();
                let brightness = area_resample(&luma, src_width, src_height, 1, width, height);
                let colors = if self.color {
                    Some(area_resample(
                        image.as_raw(),
                        src_width,
                        src_height,
                        3,
                        width,
                        height,
                    ))
                } else {
                    None
                };
                (brightness, colors)
            }
        };

        let content = self.compose(&brightness, colors.as_deref(), width as usize);

        debug!(
            "Converted {}x{} frame to {}x{} glyphs{}",
            src_width,
            src_height,
            width,
            height,
            if colors.is_some() { " (color)" } else { "" }
        );

        Ok(RenderedFrame {
            content,
            width,
            height,
            timestamp: frame.timestamp,
        })
    }

    /// Emit one glyph per cell, prefixed by a foreground escape when colors
    /// are present; colored rows end with a reset
    fn compose(&self, brightness: &[u8], colors: Option<&[u8]>, width: usize) -> String {
        let per_cell = if colors.is_some() { 24 } else { 4 };
        let mut content = String::with_capacity(brightness.len() * per_cell);

        for (row, cells) in brightness.chunks(width).enumerate() {
            if row > 0 {
                content.push('\n');
            }
            for (col, &value) in cells.iter().enumerate() {
                if let Some(colors) = colors {
                    let i = (row * width + col) * 3;
                    let color = Color::Rgb {
                        r: colors[i],
                        g: colors[i + 1],
                        b: colors[i + 2],
                    };
                    write_command(&mut content, SetForegroundColor(color));
                }
                content.push(self.ramp.glyph_for(value));
            }
            if colors.is_some() {
                write_command(&mut content, ResetColor);
            }
        }

        content
    }
}

fn write_command(out: &mut String, command: impl Command) {
    // Writing into a String cannot fail
    let _ = command.write_ansi(out);
}

/// Calculate luminance from RGB values using ITU-R BT.601 luma coefficients
fn calculate_luminance(r: u8, g: u8, b: u8) -> u8 {
    let luminance = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    luminance.round().clamp(0.0, 255.0) as u8
}

/// Area-averaging resample of an interleaved `channels`-wide buffer.
///
/// Every output cell is the coverage-weighted mean of the source pixels
/// that fall inside its footprint.
fn area_resample(
    data: &[u8],
    src_width: u32,
    src_height: u32,
    channels: usize,
    dst_width: u32,
    dst_height: u32,
) -> Vec<u8> {
    let columns = area_weights(src_width as usize, dst_width as usize);
    let rows = area_weights(src_height as usize, dst_height as usize);
    let row_stride = src_width as usize * channels;

    let mut resampled = Vec::with_capacity(dst_width as usize * dst_height as usize * channels);
    let mut acc = vec![0.0f64; channels];

    for row_weights in &rows {
        for column_weights in &columns {
            acc.iter_mut().for_each(|v| *v = 0.0);
            for &(sy, wy) in row_weights {
                for &(sx, wx) in column_weights {
                    let weight = wy * wx;
                    let base = sy * row_stride + sx * channels;
                    for (c, value) in acc.iter_mut().enumerate() {
                        *value += data[base + c] as f64 * weight;
                    }
                }
            }
            resampled.extend(acc.iter().map(|v| v.round().clamp(0.0, 255.0) as u8));
        }
    }

    resampled
}

/// Source indices covered by each destination index along one axis, with
/// weights normalised to sum to one
fn area_weights(src: usize, dst: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = src as f64 / dst as f64;

    (0..dst)
        .map(|d| {
            let start = d as f64 * scale;
            let end = start + scale;
            let first = (start.floor() as usize).min(src - 1);
            let last = (end.ceil() as usize).clamp(first + 1, src);

            let mut weights: Vec<(usize, f64)> = (first..last)
                .filter_map(|s| {
                    let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (overlap > 0.0).then_some((s, overlap / scale))
                })
                .collect();
            if weights.is_empty() {
                weights.push((first, 1.0));
            }
            weights
        })
        .collect()
}

/// Convenience function to convert a frame with the given settings
pub fn frame_to_ascii(
    frame: &RasterFrame,
    config: &PlaybackConfig,
    terminal_width: u32,
    terminal_height: u32,
) -> Result<RenderedFrame> {
    FrameConverter::new(config)?.convert(frame, terminal_width, terminal_height)
}
