//! ASCII Reel - plays video files as character art in the terminal
//!
//! This crate turns decoded video frames into grids of glyphs and plays them
//! back at the source's native frame rate, re-fitting the output to the
//! terminal on every frame so resizes are picked up mid-playback.

pub mod cli;
pub mod converter;
pub mod decoder;
pub mod dimensions;
pub mod player;
pub mod ramp;
pub mod renderer;

use std::path::PathBuf;

pub use cli::Cli;
pub use converter::{frame_to_ascii, FrameConverter, PlaybackConfig, RenderedFrame};
pub use decoder::{FfmpegSource, RasterFrame, VideoMetadata, VideoSource};
pub use dimensions::{aspect_preset, parse_aspect_ratio, DimensionResolver, CHAR_CELL_ASPECT};
pub use player::{
    CancellationToken, PlaybackOutcome, PlaybackReport, PlaybackState, Player, RenderedFrames,
};
pub use ramp::{GlyphRamp, RampPreset};
pub use renderer::{Renderer, TerminalSink};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

/// Package description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Frame rate used when a source reports zero or a negative rate
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Error types used throughout the application
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Video not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to open video '{}': {reason}", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Failed to decode frame: {0}")]
    DecodeFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Utility functions
pub mod utils {
    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds.max(0.0) as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }

    /// Calculate aspect ratio from dimensions
    pub fn calculate_aspect_ratio(width: u32, height: u32) -> f64 {
        width as f64 / height as f64
    }

    /// Pick the frame rate to pace playback with, falling back when the
    /// reported rate is unusable
    pub fn effective_frame_rate(reported: f64, fallback: f64) -> f64 {
        if reported.is_finite() && reported > 0.0 {
            reported
        } else {
            fallback
        }
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        frame_to_ascii, parse_aspect_ratio, utils::*, CancellationToken, Cli, DimensionResolver,
        FfmpegSource, FrameConverter, GlyphRamp, PlaybackConfig, PlaybackOutcome, PlaybackReport,
        PlaybackState, Player, PlayerError, RampPreset, RasterFrame, RenderedFrame,
        RenderedFrames, Renderer, Result, TerminalSink, VideoMetadata, VideoSource,
        CHAR_CELL_ASPECT, DEFAULT_FRAME_RATE,
    };
}
