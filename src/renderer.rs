use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Print, ResetColor},
    terminal::{Clear, ClearType},
};
use log::debug;
use std::io::{stdout, Stdout, Write};

/// Bounds reported when the terminal size cannot be queried
pub const FALLBACK_BOUNDS: (u16, u16) = (80, 24);

/// Where rendered frames are written.
///
/// Writes may be buffered; nothing is guaranteed visible until `flush`.
pub trait TerminalSink {
    /// Current `(columns, rows)`; queried fresh on every call
    fn query_bounds(&self) -> (u16, u16);

    fn write(&mut self, text: &str) -> std::io::Result<()>;

    fn flush(&mut self) -> std::io::Result<()>;

    fn hide_cursor(&mut self) -> std::io::Result<()>;

    fn show_cursor(&mut self) -> std::io::Result<()>;

    /// Clear the screen and move the cursor to the top-left corner
    fn clear_and_home(&mut self) -> std::io::Result<()>;
}

/// Terminal sink on stdout, driven through crossterm
pub struct Renderer {
    stdout: Stdout,
    cursor_hidden: bool,
}

impl Renderer {
    /// Create a new renderer
    pub fn new() -> Self {
        Self {
            stdout: stdout(),
            cursor_hidden: false,
        }
    }

    /// Whether the cursor is currently hidden by this renderer
    pub fn cursor_hidden(&self) -> bool {
        self.cursor_hidden
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSink for Renderer {
    fn query_bounds(&self) -> (u16, u16) {
        match crossterm::terminal::size() {
            Ok((columns, rows)) if columns > 0 && rows > 0 => (columns, rows),
            Ok(_) | Err(_) => FALLBACK_BOUNDS,
        }
    }

    fn write(&mut self, text: &str) -> std::io::Result<()> {
        queue!(self.stdout, Print(text))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stdout.flush()
    }

    fn hide_cursor(&mut self) -> std::io::Result<()> {
        execute!(self.stdout, Hide)?;
        self.cursor_hidden = true;
        debug!("Cursor hidden");
        Ok(())
    }

    fn show_cursor(&mut self) -> std::io::Result<()> {
        execute!(self.stdout, ResetColor, Show)?;
        self.cursor_hidden = false;
        debug!("Cursor restored");
        Ok(())
    }

    fn clear_and_home(&mut self) -> std::io::Result<()> {
        queue!(self.stdout, Clear(ClearType::All), MoveTo(0, 0))
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Covers early returns and unwinding panics; release builds abort on
        // panic, so there the player's own cleanup is the only restore
        if self.cursor_hidden {
            let _ = self.show_cursor();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_never_zero() {
        let renderer = Renderer::new();
        let (columns, rows) = renderer.query_bounds();
        assert!(columns > 0);
        assert!(rows > 0);
    }

    #[test]
    fn test_drop_restores_hidden_cursor() {
        let mut renderer = Renderer::new();
        renderer.hide_cursor().unwrap();
        assert!(renderer.cursor_hidden());
        // Drop writes the show-cursor sequence itself
        drop(renderer);
    }

    #[test]
    fn test_cursor_state_tracking() {
        let mut renderer = Renderer::new();
        assert!(!renderer.cursor_hidden());

        renderer.hide_cursor().unwrap();
        assert!(renderer.cursor_hidden());

        renderer.show_cursor().unwrap();
        assert!(!renderer.cursor_hidden());
    }
}
