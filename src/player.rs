//! Real-time playback of a video source as character art.
//!
//! [`Player::play`] drives a single-threaded loop: pull a frame, convert it
//! for the current terminal size, draw it, then sleep out the remainder of
//! the frame period. The sleep is the only await point and is raced against
//! a [`CancellationToken`], so a stop request is honoured within one render
//! step. Falling behind is absorbed; frames are never skipped.

use crate::converter::{FrameConverter, PlaybackConfig, RenderedFrame};
use crate::decoder::{VideoMetadata, VideoSource};
use crate::renderer::TerminalSink;
use crate::utils::effective_frame_rate;
use crate::Result;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Where the scheduler is in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Opening,
    Playing,
    /// End of stream reached with looping on; rewinding to frame 0
    Looping,
    Stopped,
    Cancelled,
}

/// How a playback session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The source ran out of frames and looping was off
    Finished,
    /// A stop was requested through the cancellation token
    Cancelled,
}

/// Summary returned by [`Player::play`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub outcome: PlaybackOutcome,
    /// Frames drawn across all passes
    pub frames_rendered: u64,
    /// Number of times the source was rewound
    pub loops: u64,
}

/// Cooperative stop signal shared between the player and whoever may
/// interrupt it (a Ctrl+C handler, an observer, another task).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a token that has not fired
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Playback scheduler
pub struct Player {
    config: PlaybackConfig,
    converter: FrameConverter,
    state: PlaybackState,
}

impl Player {
    /// Validate the configuration and build the converter
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        let converter = FrameConverter::new(&config)?;
        Ok(Self {
            config,
            converter,
            state: PlaybackState::Idle,
        })
    }

    /// Get the current playback state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Get the session configuration
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Get the frame converter used for every frame
    pub fn converter(&self) -> &FrameConverter {
        &self.converter
    }

    /// Open a source and play it to the terminal until it ends or `cancel`
    /// fires.
    ///
    /// The cursor is hidden only once the source has opened, and is shown
    /// again (followed by a trailing newline) on every exit from playback,
    /// errors included. The source is closed on every path.
    ///
    /// `observer` is called in-line after each frame is flushed, with the
    /// frame and its index within the current pass. A slow observer delays
    /// the next frame by the same amount.
    pub async fn play<S, F, T>(
        &mut self,
        open: F,
        terminal: &mut T,
        cancel: &CancellationToken,
        observer: Option<&mut dyn FnMut(&RenderedFrame, u64)>,
    ) -> Result<PlaybackReport>
    where
        S: VideoSource,
        F: FnOnce() -> Result<S>,
        T: TerminalSink,
    {
        self.state = PlaybackState::Opening;
        let mut source = match open() {
            Ok(source) => source,
            Err(e) => {
                self.state = PlaybackState::Stopped;
                return Err(e);
            }
        };

        let metadata = source.metadata();
        let fps = effective_frame_rate(metadata.frame_rate, self.config.fallback_fps);
        info!(
            "Playing {} frames at {:.2} FPS ({:.1}s){}",
            metadata.frame_count,
            fps,
            metadata.frame_count as f64 / fps,
            if self.config.loop_playback { ", looping" } else { "" }
        );

        if let Err(e) = terminal.hide_cursor() {
            source.close();
            self.state = PlaybackState::Stopped;
            return Err(e.into());
        }
        self.state = PlaybackState::Playing;

        let result = self
            .run(&mut source, terminal, cancel, observer, metadata, fps)
            .await;

        source.close();
        let restored = restore_terminal(terminal);

        self.state = match &result {
            Ok(report) if report.outcome == PlaybackOutcome::Cancelled => PlaybackState::Cancelled,
            _ => PlaybackState::Stopped,
        };

        let report = result?;
        restored?;
        info!(
            "Playback {:?} after {} frames ({} loops)",
            report.outcome, report.frames_rendered, report.loops
        );
        Ok(report)
    }

    async fn run<S, T>(
        &mut self,
        source: &mut S,
        terminal: &mut T,
        cancel: &CancellationToken,
        mut observer: Option<&mut dyn FnMut(&RenderedFrame, u64)>,
        metadata: VideoMetadata,
        fps: f64,
    ) -> Result<PlaybackReport>
    where
        S: VideoSource,
        T: TerminalSink,
    {
        let period = Duration::from_secs_f64(1.0 / fps);
        let duration = metadata.frame_count as f64 / fps;
        let mut index = 0u64;
        let mut report = PlaybackReport {
            outcome: PlaybackOutcome::Finished,
            frames_rendered: 0,
            loops: 0,
        };

        loop {
            if cancel.is_cancelled() {
                report.outcome = PlaybackOutcome::Cancelled;
                return Ok(report);
            }

            let started = Instant::now();

            let frame = match source.next_frame()? {
                Some(frame) => frame,
                None if self.config.loop_playback && index > 0 => {
                    self.state = PlaybackState::Looping;
                    debug!("End of stream after {} frames, rewinding", index);
                    source.seek(0)?;
                    index = 0;
                    report.loops += 1;
                    self.state = PlaybackState::Playing;
                    continue;
                }
                None => {
                    if self.config.loop_playback {
                        warn!("Source produced no frames; not looping");
                    }
                    return Ok(report);
                }
            };

            let (columns, rows) = terminal.query_bounds();
            // A single-row terminal has no room for the status line
            let show_status = self.config.show_status && rows >= 2;
            let rows = if show_status { rows - 1 } else { rows };

            let mut rendered = self
                .converter
                .convert(&frame, columns.max(1) as u32, rows.max(1) as u32)?;
            rendered.timestamp = index as f64 / fps;

            terminal.clear_and_home()?;
            terminal.write(&rendered.content)?;
            if show_status {
                let status = status_line(index, metadata.frame_count, rendered.timestamp, duration);
                terminal.write("\n")?;
                terminal.write(&truncate(&status, columns as usize))?;
            }
            terminal.flush()?;

            if let Some(observer) = observer.as_deref_mut() {
                observer(&rendered, index);
            }

            index += 1;
            report.frames_rendered += 1;

            if cancel.is_cancelled() {
                report.outcome = PlaybackOutcome::Cancelled;
                return Ok(report);
            }

            if let Some(remaining) = period.checked_sub(started.elapsed()) {
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = cancel.cancelled() => {
                        report.outcome = PlaybackOutcome::Cancelled;
                        return Ok(report);
                    }
                }
            } else {
                debug!("Frame {} overran its {:?} period", index - 1, period);
            }
        }
    }

    /// Convert every frame of `source` for fixed bounds without pacing or
    /// drawing. With looping on, the iterator never ends on its own.
    pub fn frames<S: VideoSource>(&self, source: S, columns: u32, rows: u32) -> RenderedFrames<S> {
        let fps = effective_frame_rate(source.metadata().frame_rate, self.config.fallback_fps);
        RenderedFrames {
            source,
            converter: self.converter.clone(),
            bounds: (columns, rows),
            loop_playback: self.config.loop_playback,
            frame_duration: 1.0 / fps,
            index: 0,
            closed: false,
        }
    }
}

/// Status line: elapsed and total time, frame position, percent complete
pub fn status_line(index: u64, frame_count: u64, timestamp: f64, duration: f64) -> String {
    let progress = if frame_count > 0 {
        ((index + 1) as f64 / frame_count as f64 * 100.0).min(100.0)
    } else {
        0.0
    };
    format!(
        "[{:05.1}s / {:05.1}s] Frame {}/{} ({:.0}%)",
        timestamp,
        duration,
        index + 1,
        frame_count,
        progress
    )
}

fn truncate(text: &str, columns: usize) -> String {
    text.chars().take(columns.max(1)).collect()
}

fn restore_terminal<T: TerminalSink>(terminal: &mut T) -> std::io::Result<()> {
    let shown = terminal.show_cursor();
    let newline = terminal.write("\n").and_then(|_| terminal.flush());
    shown.and(newline)
}

/// Untimed iterator over the converted frames of a source
pub struct RenderedFrames<S: VideoSource> {
    source: S,
    converter: FrameConverter,
    bounds: (u32, u32),
    loop_playback: bool,
    frame_duration: f64,
    index: u64,
    closed: bool,
}

impl<S: VideoSource> RenderedFrames<S> {
    fn close(&mut self) {
        if !self.closed {
            self.source.close();
            self.closed = true;
        }
    }
}

impl<S: VideoSource> Iterator for RenderedFrames<S> {
    type Item = Result<RenderedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }

        loop {
            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    let (columns, rows) = self.bounds;
                    let converted = self.converter.convert(&frame, columns, rows).map(|mut f| {
                        f.timestamp = self.index as f64 * self.frame_duration;
                        f
                    });
                    self.index += 1;
                    if converted.is_err() {
                        self.close();
                    }
                    return Some(converted);
                }
                Ok(None) if self.loop_playback && self.index > 0 => {
                    if let Err(e) = self.source.seek(0) {
                        self.close();
                        return Some(Err(e));
                    }
                    self.index = 0;
                }
                Ok(None) => {
                    self.close();
                    return None;
                }
                Err(e) => {
                    self.close();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<S: VideoSource> Drop for RenderedFrames<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RasterFrame;
    use crate::PlayerError;
    use std::cell::Cell;
    use std::rc::Rc;

    struct ScriptedSource {
        frames: Vec<u8>,
        position: usize,
        fail_at: Option<usize>,
        closed: Rc<Cell<bool>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<u8>) -> Self {
            Self {
                frames,
                position: 0,
                fail_at: None,
                closed: Rc::new(Cell::new(false)),
            }
        }
    }

    impl VideoSource for ScriptedSource {
        fn metadata(&self) -> VideoMetadata {
            VideoMetadata {
                frame_rate: 1000.0,
                frame_count: self.frames.len() as u64,
                width: 4,
                height: 2,
            }
        }

        fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
            if self.fail_at == Some(self.position) {
                return Err(PlayerError::DecodeFailure("scripted".to_string()));
            }
            let Some(&value) = self.frames.get(self.position) else {
                return Ok(None);
            };
            self.position += 1;
            RasterFrame::gray(4, 2, vec![value; 8], 0.0).map(Some)
        }

        fn seek(&mut self, frame_index: u64) -> Result<()> {
            self.position = frame_index as usize;
            Ok(())
        }

        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    #[derive(Default)]
    struct NullTerminal {
        output: String,
        cursor_hidden: bool,
    }

    impl TerminalSink for NullTerminal {
        fn query_bounds(&self) -> (u16, u16) {
            (8, 5)
        }
        fn write(&mut self, text: &str) -> std::io::Result<()> {
            self.output.push_str(text);
            Ok(())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn hide_cursor(&mut self) -> std::io::Result<()> {
            self.cursor_hidden = true;
            Ok(())
        }
        fn show_cursor(&mut self) -> std::io::Result<()> {
            self.cursor_hidden = false;
            Ok(())
        }
        fn clear_and_home(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config(loop_playback: bool) -> PlaybackConfig {
        PlaybackConfig {
            chars: "AB".to_string(),
            loop_playback,
            show_status: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_status_line_format() {
        assert_eq!(
            status_line(0, 4, 0.0, 2.0),
            "[000.0s / 002.0s] Frame 1/4 (25%)"
        );
        assert_eq!(
            status_line(9, 0, 0.3, 0.0),
            "[000.3s / 000.0s] Frame 10/0 (0%)"
        );
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 0), "a");
    }

    #[tokio::test]
    async fn test_cancellation_token_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_frame() {
        let mut player = Player::new(config(false)).unwrap();
        let mut terminal = NullTerminal::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = player
            .play(|| Ok(ScriptedSource::new(vec![0, 0])), &mut terminal, &cancel, None)
            .await
            .unwrap();

        assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
        assert_eq!(report.frames_rendered, 0);
        assert_eq!(player.state(), PlaybackState::Cancelled);
        assert!(!terminal.cursor_hidden);
    }

    #[tokio::test]
    async fn test_empty_source_with_loop_stops() {
        let mut player = Player::new(config(true)).unwrap();
        let mut terminal = NullTerminal::default();

        let report = player
            .play(
                || Ok(ScriptedSource::new(Vec::new())),
                &mut terminal,
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.outcome, PlaybackOutcome::Finished);
        assert_eq!(report.frames_rendered, 0);
        assert_eq!(player.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_frames_iterator_timestamps_and_close() {
        let player = Player::new(config(false)).unwrap();
        let source = ScriptedSource::new(vec![0, 255, 0]);
        let closed = source.closed.clone();

        let frames: Vec<RenderedFrame> = player
            .frames(source, 4, 1)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].content, "BBBB");
        assert_eq!(frames[2].timestamp, 2.0 / 1000.0);
        assert!(closed.get());
    }

    #[test]
    fn test_frames_iterator_loops() {
        let player = Player::new(config(true)).unwrap();
        let contents: Vec<String> = player
            .frames(ScriptedSource::new(vec![0, 255]), 2, 1)
            .take(5)
            .map(|f| f.unwrap().content)
            .collect();
        assert_eq!(contents, vec!["AA", "BB", "AA", "BB", "AA"]);
    }

    #[test]
    fn test_frames_iterator_surfaces_decode_failure() {
        let player = Player::new(config(false)).unwrap();
        let mut source = ScriptedSource::new(vec![0, 0, 0]);
        source.fail_at = Some(1);

        let mut frames = player.frames(source, 2, 1);
        assert!(frames.next().unwrap().is_ok());
        assert!(matches!(
            frames.next(),
            Some(Err(PlayerError::DecodeFailure(_)))
        ));
        assert!(frames.next().is_none());
    }
}
