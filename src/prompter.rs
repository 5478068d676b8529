//! Lyrics display with auto-scroll
//!
//! Scrolling moves one pixel per step, one step every `200ms / speed`: every
//! 200ms at speed 1, every 10ms at speed 20. A line is revealed each time the
//! offset crosses a line boundary.

use log::debug;
use std::path::Path;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};

/// Pixels the scroll offset moves through per line of text
pub const LINE_HEIGHT_PX: u32 = 20;
pub const MIN_SCROLL_SPEED: u8 = 1;
pub const MAX_SCROLL_SPEED: u8 = 20;
pub const DEFAULT_SCROLL_SPEED: u8 = 5;

/// Step interval at speed 1, in milliseconds
const SCROLL_BASE_MS: u64 = 200;

/// A song sheet: plain lyrics and chords
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Song {
    title: String,
    lines: Vec<String>,
}

impl Song {
    /// Read a UTF-8 text file; the title is the file stem
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string());
        Ok(Self::from_text(&title, &text))
    }

    pub fn from_text(title: &str, text: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: text.lines().map(|l| l.trim_end().to_string()).collect(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// The song on screen and its scroll state
pub struct Prompter {
    song: Option<Song>,
    speed: u8,
    offset_px: u32,
    ticker: Option<Interval>,
}

impl Prompter {
    pub fn new() -> Self {
        Self {
            song: None,
            speed: DEFAULT_SCROLL_SPEED,
            offset_px: 0,
            ticker: None,
        }
    }

    /// Show a new song from the top; scrolling state is kept
    pub fn load(&mut self, song: Song) {
        debug!("Showing '{}' ({} lines)", song.title(), song.lines().len());
        self.song = Some(song);
        self.offset_px = 0;
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn is_scrolling(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start or stop auto-scroll and return whether it is now running
    pub fn toggle_scroll(&mut self) -> bool {
        if self.ticker.is_some() {
            self.ticker = None;
        } else if self.song.is_some() {
            self.ticker = Some(self.new_ticker());
        } else {
            debug!("scroll ignored: no song loaded");
        }
        self.is_scrolling()
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Set the scroll speed, clamped to 1..=20, and return the value used
    pub fn set_speed(&mut self, speed: u8) -> u8 {
        self.speed = speed.clamp(MIN_SCROLL_SPEED, MAX_SCROLL_SPEED);
        if self.ticker.is_some() {
            self.ticker = Some(self.new_ticker());
        }
        self.speed
    }

    /// Time between scroll steps at the current speed
    pub fn interval(&self) -> Duration {
        Duration::from_millis(SCROLL_BASE_MS / self.speed as u64)
    }

    /// Index of the line at the top of the view
    pub fn current_line(&self) -> usize {
        (self.offset_px / LINE_HEIGHT_PX) as usize
    }

    /// Move one pixel down
    ///
    /// Returns the index of a newly revealed line. Scrolling stops once the
    /// last line is at the top.
    pub fn step(&mut self) -> Option<usize> {
        let last = self.song.as_ref()?.lines().len().saturating_sub(1);
        if self.current_line() >= last {
            self.ticker = None;
            return None;
        }

        let before = self.current_line();
        self.offset_px += 1;
        let now = self.current_line();
        (now != before).then_some(now)
    }

    /// Wait for scrolling to reveal the next line
    ///
    /// Resolves to `None` when the end of the song stops scrolling. Never
    /// resolves while scrolling is off.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            match self.ticker.as_mut() {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => return std::future::pending().await,
            }

            if let Some(index) = self.step() {
                return self.song.as_ref().map(|s| s.lines()[index].clone());
            }
            if self.ticker.is_none() {
                return None;
            }
        }
    }

    fn new_ticker(&self) -> Interval {
        let period = self.interval();
        interval_at(Instant::now() + period, period)
    }
}

impl Default for Prompter {
    fn default() -> Self {
        Self::new()
    }
}
