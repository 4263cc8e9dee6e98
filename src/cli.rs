use crate::converter::PlaybackConfig;
use crate::dimensions::parse_aspect_ratio;
use crate::ramp::RampPreset;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the video file to play
    #[arg(required = true)]
    pub file_path: PathBuf,

    /// Output width in characters (default: fit the terminal)
    #[arg(short, long)]
    pub width: Option<u32>,

    /// Output height in characters (default: fit the terminal)
    #[arg(short = 'H', long)]
    pub height: Option<u32>,

    /// Force aspect ratio as W:H, a decimal or a preset (e.g. 16:9, 1.5, reel, video, square)
    #[arg(short, long, value_parser = parse_aspect_arg)]
    pub aspect: Option<f64>,

    /// Character preset (default: detailed)
    #[arg(short, long, value_enum)]
    pub preset: Option<RampPreset>,

    /// Custom character ramp, darkest to lightest. Overrides --preset
    #[arg(short, long)]
    pub chars: Option<String>,

    /// Invert brightness mapping (useful for light terminals)
    #[arg(short, long)]
    pub invert: bool,

    /// Enable 24-bit colored output
    #[arg(short = 'C', long)]
    pub color: bool,

    /// Loop the video playback
    #[arg(short, long = "loop")]
    pub loop_playback: bool,

    /// Hide the status line
    #[arg(short = 's', long)]
    pub no_status: bool,

    /// Frame rate to use when the video does not report one
    #[arg(long, value_name = "FPS")]
    pub fallback_fps: Option<f64>,

    /// Load playback settings from a JSON file; flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Show video information only (don't play)
    #[arg(long)]
    pub info_only: bool,

    /// Print video information as JSON
    #[arg(long, requires = "info_only")]
    pub json: bool,

    /// Print the first converted frame and exit
    #[arg(long)]
    pub single_frame: bool,
}

fn parse_aspect_arg(value: &str) -> Result<f64, String> {
    parse_aspect_ratio(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<(), String> {
        if !self.file_path.exists() {
            return Err(format!(
                "Video file does not exist: {}",
                self.file_path.display()
            ));
        }

        if self.width == Some(0) {
            return Err("Width must be greater than 0".to_string());
        }

        if self.height == Some(0) {
            return Err("Height must be greater than 0".to_string());
        }

        if let Some(chars) = &self.chars {
            if chars.is_empty() {
                return Err("Character ramp must not be empty".to_string());
            }
        }

        if let Some(fps) = self.fallback_fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err("Fallback FPS must be greater than 0".to_string());
            }
        }

        Ok(())
    }

    /// Build the session configuration: the config file (if any) first,
    /// then every flag given on the command line on top of it
    pub fn playback_config(&self) -> crate::Result<PlaybackConfig> {
        let mut config = match &self.config {
            Some(path) => PlaybackConfig::from_json_file(path)?,
            None => PlaybackConfig::default(),
        };

        if let Some(chars) = &self.chars {
            config.chars = chars.clone();
        } else if let Some(preset) = self.preset {
            config.chars = preset.chars().to_string();
        }

        if self.width.is_some() {
            config.width = self.width;
        }
        if self.height.is_some() {
            config.height = self.height;
        }
        if self.aspect.is_some() {
            config.aspect_ratio = self.aspect;
        }
        if let Some(fps) = self.fallback_fps {
            config.fallback_fps = fps;
        }

        config.invert |= self.invert;
        config.color |= self.color;
        config.loop_playback |= self.loop_playback;
        if self.no_status {
            config.show_status = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::ASPECT_RATIO_REEL;
    use crate::ramp::SIMPLE_RAMP;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ascii-reel"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_map_to_default_config() {
        let cli = parse(&["video.mp4"]);
        assert_eq!(cli.playback_config().unwrap(), PlaybackConfig::default());
    }

    #[test]
    fn test_flags_override() {
        let cli = parse(&[
            "video.mp4", "-w", "100", "-a", "9:16", "-p", "simple", "-i", "-C", "-l", "-s",
        ]);
        let config = cli.playback_config().unwrap();
        assert_eq!(config.width, Some(100));
        assert_eq!(config.height, None);
        assert_eq!(config.aspect_ratio, Some(0.5625));
        assert_eq!(config.chars, SIMPLE_RAMP);
        assert!(config.invert && config.color && config.loop_playback);
        assert!(!config.show_status);
    }

    #[test]
    fn test_chars_beat_preset() {
        let cli = parse(&["video.mp4", "-p", "blocks", "-c", "xyz"]);
        assert_eq!(cli.playback_config().unwrap().chars, "xyz");
    }

    #[test]
    fn test_aspect_preset_by_name() {
        let cli = parse(&["video.mp4", "--aspect", "reel"]);
        assert_eq!(cli.aspect, Some(ASPECT_RATIO_REEL));
        let cli = parse(&["video.mp4", "-a", "square"]);
        assert_eq!(cli.playback_config().unwrap().aspect_ratio, Some(1.0));
    }

    #[test]
    fn test_malformed_aspect_rejected_at_parse() {
        let result = Cli::try_parse_from(["ascii-reel", "video.mp4", "--aspect", "abc"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_json_requires_info_only() {
        let result = Cli::try_parse_from(["ascii-reel", "video.mp4", "--json"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_missing_file_and_zero_sizes() {
        let cli = parse(&["definitely-missing.mp4"]);
        assert!(cli.validate().unwrap_err().contains("does not exist"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();
        let path = path.to_str().unwrap();

        assert!(parse(&[path]).validate().is_ok());
        assert!(parse(&[path, "--width", "0"]).validate().is_err());
        assert!(parse(&[path, "--chars", ""]).validate().is_err());
        assert!(parse(&[path, "--fallback-fps", "0"]).validate().is_err());
    }

    #[test]
    fn test_config_file_layered_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reel.json");
        std::fs::write(&path, r#"{ "chars": "01", "height": 12, "loop_playback": true }"#).unwrap();

        let cli = parse(&["video.mp4", "--config", path.to_str().unwrap(), "-H", "20"]);
        let config = cli.playback_config().unwrap();
        assert_eq!(config.chars, "01");
        assert_eq!(config.height, Some(20));
        assert!(config.loop_playback);
    }
}
