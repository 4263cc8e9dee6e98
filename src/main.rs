use ascii_reel::prelude::*;
use ascii_reel::VERSION;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    cli.validate()
        .map_err(|e| anyhow!("Invalid arguments: {}", e))?;
    let config = cli.playback_config().context("Invalid playback settings")?;

    debug!("Starting ASCII Reel v{} with {:?}", VERSION, config);

    if !atty::is(atty::Stream::Stdout) {
        warn!("stdout is not a terminal; frames and escape sequences are written verbatim");
    }

    if cli.info_only {
        let source = open_source(&cli.file_path)?;
        print_info(&cli.file_path, &source.metadata(), cli.json)?;
        return Ok(());
    }

    let mut player = Player::new(config)?;

    if cli.single_frame {
        let source = open_source(&cli.file_path)?;
        let (columns, rows) = Renderer::new().query_bounds();
        match player.frames(source, columns as u32, rows as u32).next() {
            Some(frame) => println!("{}", frame?.content),
            None => warn!("Video contains no frames"),
        }
        return Ok(());
    }

    let source = open_source(&cli.file_path)?;
    let metadata = source.metadata();
    let fps = effective_frame_rate(metadata.frame_rate, player.config().fallback_fps);

    println!("Playing: {}", cli.file_path.display());
    println!(
        "Duration: {} | Frames: {} | FPS: {:.1}",
        format_duration(metadata.frame_count as f64 / fps),
        metadata.frame_count,
        fps
    );
    println!("Press Ctrl+C to stop\n");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl+C pressed, stopping playback");
            interrupt.cancel();
        }
    });

    // Brief pause so the header can be read
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        _ = cancel.cancelled() => {}
    }

    let mut renderer = Renderer::new();
    let report = player
        .play(move || Ok(source), &mut renderer, &cancel, None)
        .await
        .context("Playback failed")?;

    match report.outcome {
        PlaybackOutcome::Cancelled => println!("Playback stopped."),
        PlaybackOutcome::Finished => info!(
            "Playback finished. Total frames: {}",
            report.frames_rendered
        ),
    }

    Ok(())
}

fn open_source(path: &Path) -> Result<FfmpegSource> {
    FfmpegSource::open(path).with_context(|| format!("Failed to load video '{}'", path.display()))
}

fn print_info(path: &Path, metadata: &VideoMetadata, json: bool) -> Result<()> {
    if json {
        let info = serde_json::json!({
            "file": path.display().to_string(),
            "metadata": metadata,
            "duration": metadata.duration(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Video Information:");
    println!("  File: {}", path.display());
    println!("  Dimensions: {}x{}", metadata.width, metadata.height);
    println!("  Frame Rate: {:.2} FPS", metadata.frame_rate);
    println!("  Frames: {}", metadata.frame_count);
    println!(
        "  Duration: {} ({:.2} seconds)",
        format_duration(metadata.duration()),
        metadata.duration()
    );
    if metadata.height > 0 {
        println!(
            "  Aspect Ratio: {:.2}",
            calculate_aspect_ratio(metadata.width, metadata.height)
        );
    }
    Ok(())
}
