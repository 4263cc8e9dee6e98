use crate::utils::calculate_aspect_ratio;
use crate::{PlayerError, Result};
use log::debug;

/// Width-to-height ratio of one glyph cell; cells are twice as tall as wide
pub const CHAR_CELL_ASPECT: f64 = 0.5;

/// Vertical short-form video (reels, shorts)
pub const ASPECT_RATIO_REEL: f64 = 9.0 / 16.0;

/// Standard horizontal video
pub const ASPECT_RATIO_VIDEO: f64 = 16.0 / 9.0;

/// Square video
pub const ASPECT_RATIO_SQUARE: f64 = 1.0;

/// Computes the output character grid for a source frame.
///
/// Terminal bounds are an explicit input on every call; nothing is cached,
/// so a resized terminal is honoured on the next frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DimensionResolver {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub aspect_ratio: Option<f64>,
}

impl DimensionResolver {
    /// Create a resolver from the optional size and aspect settings
    pub fn new(width: Option<u32>, height: Option<u32>, aspect_ratio: Option<f64>) -> Self {
        Self {
            width,
            height,
            aspect_ratio,
        }
    }

    /// Resolve `(columns, rows)` of the output grid.
    ///
    /// The result always lies in `[1, terminal_width] x [1, terminal_height]`.
    /// When both width and height are configured they are only clamped to
    /// the terminal; no aspect correction is applied in that case.
    pub fn resolve(
        &self,
        source_width: u32,
        source_height: u32,
        terminal_width: u32,
        terminal_height: u32,
    ) -> (u32, u32) {
        let term_width = terminal_width.max(1);
        let term_height = terminal_height.max(1);

        if let (Some(width), Some(height)) = (self.width, self.height) {
            return (
                width.min(term_width).max(1),
                height.min(term_height).max(1),
            );
        }

        let aspect_ratio = match self.aspect_ratio {
            Some(forced) => forced,
            None => calculate_aspect_ratio(source_width, source_height),
        };
        let char_adjusted = sanitize_ratio(aspect_ratio) / CHAR_CELL_ASPECT;

        let (width, height) = match (self.width, self.height) {
            (Some(width), None) => {
                let width = width.min(term_width);
                (width, round_cells(width as f64 / char_adjusted))
            }
            (None, Some(height)) => {
                let height = height.min(term_height);
                (round_cells(height as f64 * char_adjusted), height)
            }
            _ => {
                let height = round_cells(term_width as f64 / char_adjusted);
                if height > term_height {
                    (round_cells(term_height as f64 * char_adjusted), term_height)
                } else {
                    (term_width, height)
                }
            }
        };

        let resolved = (
            width.clamp(1, term_width),
            height.clamp(1, term_height),
        );
        debug!(
            "Resolved {}x{} source into {}x{} cells (terminal {}x{}, ratio {:.3})",
            source_width, source_height, resolved.0, resolved.1, term_width, term_height,
            char_adjusted
        );
        resolved
    }
}

/// Look up a named aspect ratio preset (`reel`, `video`, `square`)
pub fn aspect_preset(name: &str) -> Option<f64> {
    match name.trim().to_ascii_lowercase().as_str() {
        "reel" => Some(ASPECT_RATIO_REEL),
        "video" => Some(ASPECT_RATIO_VIDEO),
        "square" => Some(ASPECT_RATIO_SQUARE),
        _ => None,
    }
}

/// Parse an aspect ratio given as a preset name, `"W:H"` or a decimal
pub fn parse_aspect_ratio(value: &str) -> Result<f64> {
    let invalid = || {
        PlayerError::InvalidConfig(format!(
            "Invalid aspect ratio: {}. Use format W:H (e.g., 16:9) or reel, video, square",
            value
        ))
    };

    if let Some(ratio) = aspect_preset(value) {
        return Ok(ratio);
    }

    let trimmed = value.trim();
    let ratio = match trimmed.split_once(':') {
        Some((w, h)) => {
            let w: f64 = w.trim().parse().map_err(|_| invalid())?;
            let h: f64 = h.trim().parse().map_err(|_| invalid())?;
            if h == 0.0 {
                return Err(invalid());
            }
            w / h
        }
        None => trimmed.parse().map_err(|_| invalid())?,
    };

    if ratio.is_finite() && ratio > 0.0 {
        Ok(ratio)
    } else {
        Err(invalid())
    }
}

fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

fn round_cells(value: f64) -> u32 {
    // `as` saturates, so huge values clamp to u32::MAX and NaN to 0
    value.round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auto() -> DimensionResolver {
        DimensionResolver::default()
    }

    #[test]
    fn test_wide_source_refits_by_height() {
        // 16:9 into 40x9: width-first gives 11 rows, too tall, so fit rows
        let (w, h) = auto().resolve(1920, 1080, 40, 9);
        assert_eq!((w, h), (32, 9));
    }

    #[test]
    fn test_fits_by_width_when_possible() {
        // 1:1 source -> char-adjusted ratio 2.0 -> 80 / 2 = 40 rows
        let (w, h) = auto().resolve(100, 100, 80, 50);
        assert_eq!((w, h), (80, 40));
    }

    #[test]
    fn test_explicit_box_is_clamped_verbatim() {
        let resolver = DimensionResolver::new(Some(200), Some(5), None);
        assert_eq!(resolver.resolve(1920, 1080, 80, 24), (80, 5));

        let resolver = DimensionResolver::new(Some(10), Some(10), Some(ASPECT_RATIO_REEL));
        assert_eq!(resolver.resolve(16, 9, 80, 24), (10, 10));
    }

    #[test]
    fn test_width_only_derives_height() {
        let resolver = DimensionResolver::new(Some(40), None, None);
        // ratio 2.0 -> 40 / 2 = 20
        assert_eq!(resolver.resolve(50, 50, 100, 100), (40, 20));
        // width larger than the terminal is clamped first
        assert_eq!(resolver.resolve(50, 50, 30, 100), (30, 15));
    }

    #[test]
    fn test_height_only_derives_width() {
        let resolver = DimensionResolver::new(None, Some(10), None);
        assert_eq!(resolver.resolve(50, 50, 100, 100), (20, 10));
        // derived width is clamped to the terminal
        assert_eq!(resolver.resolve(1000, 10, 100, 100), (100, 10));
    }

    #[test]
    fn test_forced_aspect_overrides_source() {
        let resolver = DimensionResolver::new(None, None, Some(ASPECT_RATIO_REEL));
        // 0.5625 / 0.5 = 1.125 -> 80 / 1.125 = 71 rows > 24, so 24 rows, 27 cols
        assert_eq!(resolver.resolve(1920, 1080, 80, 24), (27, 24));
    }

    #[test]
    fn test_never_zero_or_out_of_bounds() {
        let ratios = [(1, 1000), (1000, 1), (16, 9), (9, 16), (1, 1), (3, 2)];
        for cols in [1u32, 2, 7, 80, 300] {
            for rows in [1u32, 2, 9, 24, 120] {
                for (sw, sh) in ratios {
                    let (w, h) = auto().resolve(sw, sh, cols, rows);
                    assert!(w >= 1 && w <= cols, "w={} cols={}", w, cols);
                    assert!(h >= 1 && h <= rows, "h={} rows={}", h, rows);
                }
            }
        }
    }

    #[test]
    fn test_degenerate_source_does_not_panic() {
        let (w, h) = auto().resolve(0, 0, 80, 24);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_parse_aspect_ratio() {
        assert_eq!(parse_aspect_ratio("9:16").unwrap(), 0.5625);
        assert_eq!(parse_aspect_ratio("1:1").unwrap(), 1.0);
        assert_eq!(parse_aspect_ratio("1.5").unwrap(), 1.5);
        assert!((parse_aspect_ratio("16:9").unwrap() - ASPECT_RATIO_VIDEO).abs() < 1e-12);
    }

    #[test]
    fn test_parse_named_presets() {
        assert_eq!(parse_aspect_ratio("reel").unwrap(), ASPECT_RATIO_REEL);
        assert_eq!(parse_aspect_ratio("video").unwrap(), ASPECT_RATIO_VIDEO);
        assert_eq!(parse_aspect_ratio("square").unwrap(), ASPECT_RATIO_SQUARE);
        assert_eq!(parse_aspect_ratio(" Reel ").unwrap(), 0.5625);
        assert_eq!(aspect_preset("cinema"), None);
    }

    #[test]
    fn test_square_preset_matches_source_ratio() {
        let forced = DimensionResolver::new(None, None, Some(ASPECT_RATIO_SQUARE));
        assert_eq!(forced.resolve(1920, 1080, 80, 50), auto().resolve(100, 100, 80, 50));
    }

    #[test]
    fn test_parse_aspect_ratio_rejects_malformed() {
        for bad in ["abc", "16:0", "0", "-1", "16:", ":9", "1:2:3", ""] {
            assert!(
                matches!(parse_aspect_ratio(bad), Err(PlayerError::InvalidConfig(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }
}
