use crate::{PlayerError, Result};

/// Detailed ramp, darkest to lightest bucket
pub const DETAILED_RAMP: &str = "@%#*+=-:. ";

/// Coarser ramp with fewer buckets
pub const SIMPLE_RAMP: &str = "@#=-. ";

/// Block character ramp for a more solid appearance
pub const BLOCK_RAMP: &str = "█▓▒░ ";

/// Named glyph ramps selectable from the command line
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RampPreset {
    /// Ten-step ramp of punctuation and symbols
    #[default]
    Detailed,
    /// Six-step ramp
    Simple,
    /// Unicode shade blocks
    Blocks,
}

impl RampPreset {
    /// Characters of this preset, darkest bucket first
    pub fn chars(self) -> &'static str {
        match self {
            RampPreset::Detailed => DETAILED_RAMP,
            RampPreset::Simple => SIMPLE_RAMP,
            RampPreset::Blocks => BLOCK_RAMP,
        }
    }
}

/// Ordered palette mapping brightness buckets to display characters.
///
/// Index 0 is used for the darkest bucket and the last index for the
/// brightest. Construction fails on an empty palette, so every lookup
/// through [`GlyphRamp::glyph_for`] lands inside the ramp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphRamp {
    glyphs: Vec<char>,
}

impl GlyphRamp {
    /// Build the effective ramp, reversed when `invert` is set
    pub fn new(chars: &str, invert: bool) -> Result<Self> {
        let mut glyphs: Vec<char> = chars.chars().collect();
        if glyphs.is_empty() {
            return Err(PlayerError::InvalidConfig(
                "glyph ramp must contain at least one character".to_string(),
            ));
        }
        if invert {
            glyphs.reverse();
        }
        Ok(Self { glyphs })
    }

    /// Effective ramp for a named preset
    pub fn preset(preset: RampPreset, invert: bool) -> Self {
        let glyphs: Vec<char> = if invert {
            preset.chars().chars().rev().collect()
        } else {
            preset.chars().chars().collect()
        };
        Self { glyphs }
    }

    /// Number of glyphs in the ramp
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// Whether the ramp has no glyphs
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Get the glyphs, darkest bucket first
    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    /// Bucket index for a brightness value: `floor(v / 255 * (len - 1))`
    pub fn index_for(&self, brightness: u8) -> usize {
        let last = self.glyphs.len().saturating_sub(1);
        let index = (brightness as f64 / 255.0 * last as f64).floor() as usize;
        index.min(last)
    }

    /// Glyph for a brightness value in `[0, 255]`
    pub fn glyph_for(&self, brightness: u8) -> char {
        self.glyphs[self.index_for(brightness)]
    }
}

impl Default for GlyphRamp {
    fn default() -> Self {
        Self::preset(RampPreset::default(), false)
    }
}
