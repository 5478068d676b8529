//! Terminal front end for Couchguitar
//!
//! One event loop reads commands from stdin and drives the playback tick, the
//! scroll tick and recorder notifications. Every command becomes a call on the
//! prompter, the playback controller or the recorder.

use crate::assets::DemoSongs;
use crate::audio::{AudioSink, AudioSource};
use crate::commands::{self, Command, HELP};
use crate::prompter::{Prompter, Song};
use crate::state::{
    PlaybackController, PlaybackStatus, Recorder, RecorderConfig, RecorderEvent, TickOutcome,
};
use log::{debug, info, trace};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Whether the loop should keep going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The application: prompter, backing track and recorder behind one loop
pub struct App<S: AudioSink, W: Write> {
    prompter: Prompter,
    player: PlaybackController<S>,
    recorder: Recorder,
    out: W,
}

impl<S: AudioSink, W: Write> App<S, W> {
    pub fn new(sink: S, source: Arc<dyn AudioSource>, config: RecorderConfig, out: W) -> Self {
        Self {
            prompter: Prompter::new(),
            player: PlaybackController::new(sink),
            recorder: Recorder::new(config, source),
            out,
        }
    }

    /// Set where `save` without a path puts takes
    pub fn with_recordings_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.recorder = self.recorder.with_recordings_dir(dir);
        self
    }

    /// Run until `quit` or end of input
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        writeln!(self.out, "Couchguitar {} - type `help` for commands", env!("CARGO_PKG_VERSION"))?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Input closed");
                        break;
                    };
                    if let Some(command) = commands::parse(&line) {
                        if self.handle(command)? == Flow::Quit {
                            break;
                        }
                    }
                }
                outcome = self.player.next_tick() => self.on_tick(outcome)?,
                event = self.recorder.next_event() => self.on_recorder_event(event)?,
                line = self.prompter.next_line() => self.on_scroll(line)?,
            }
        }

        self.recorder.stop_capture();
        self.player.stop();
        info!("Shutting down");
        Ok(())
    }

    /// Apply one command
    pub fn handle(&mut self, command: Command) -> anyhow::Result<Flow> {
        debug!("Command: {:?}", command);
        match command {
            Command::OpenSong(path) => match Song::open(&path) {
                Ok(song) => self.show_song(song)?,
                Err(e) => writeln!(self.out, "Could not open {}: {}", path.display(), e)?,
            },
            Command::DemoSong(name) => {
                let name = name.or_else(|| DemoSongs::names().into_iter().next());
                match name.as_deref().and_then(DemoSongs::song) {
                    Some(song) => self.show_song(song)?,
                    None => writeln!(self.out, "No such demo song. Type `songs` to list them.")?,
                }
            }
            Command::ListSongs => {
                for name in DemoSongs::names() {
                    writeln!(self.out, "  {}", name)?;
                }
            }
            Command::LoadTrack(path) => self.load_track(&path)?,
            Command::Play => match self.player.play() {
                Ok(()) => self.report_transport()?,
                Err(e) => writeln!(self.out, "Could not start playback: {}", e)?,
            },
            Command::Pause => {
                self.player.pause();
                self.report_transport()?;
            }
            Command::Stop => {
                self.player.stop();
                self.report_transport()?;
            }
            Command::Seek(to) => {
                if let Err(e) = self.player.seek(to) {
                    writeln!(self.out, "Could not restart playback: {}", e)?;
                }
                self.report_transport()?;
            }
            Command::StartRecording => {
                if self.recorder.start_capture() {
                    let max = self.recorder.config().max_duration;
                    writeln!(self.out, "Recording (max {}). Type `finish` to stop.", clock(max))?;
                } else {
                    writeln!(self.out, "Already recording.")?;
                }
            }
            Command::StopRecording => self.recorder.stop_capture(),
            Command::SaveRecording(path) => self.save_take(path)?,
            Command::ToggleScroll => {
                if self.prompter.toggle_scroll() {
                    writeln!(self.out, "Scrolling at speed {}", self.prompter.speed())?;
                } else if self.prompter.song().is_some() {
                    writeln!(self.out, "Scrolling paused")?;
                }
            }
            Command::SetSpeed(speed) => {
                let speed = self.prompter.set_speed(speed);
                writeln!(self.out, "Scroll speed {}", speed)?;
            }
            Command::Status => self.report_status()?,
            Command::Help => writeln!(self.out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
            Command::Unknown(input) => {
                writeln!(self.out, "Unknown command '{}'. Type `help` for commands.", input)?
            }
        }
        Ok(Flow::Continue)
    }

    fn show_song(&mut self, song: Song) -> anyhow::Result<()> {
        writeln!(self.out, "== {} ==", song.title())?;
        if let Some(first) = song.lines().first() {
            writeln!(self.out, "{}", first)?;
        }
        self.prompter.load(song);
        Ok(())
    }

    fn load_track(&mut self, path: &Path) -> anyhow::Result<()> {
        match self.player.load(path) {
            Ok(()) => writeln!(
                self.out,
                "Loaded {} ({})",
                path.display(),
                clock(self.player.duration())
            )?,
            Err(e) => writeln!(self.out, "Could not load {}: {}", path.display(), e)?,
        }
        Ok(())
    }

    fn save_take(&mut self, path: Option<PathBuf>) -> anyhow::Result<()> {
        let saved = match path {
            Some(path) => self.recorder.save_capture(&path).map(|saved| saved.then_some(path)),
            None => self.recorder.save_capture_default(),
        };
        match saved {
            Ok(Some(path)) => writeln!(self.out, "Saved take to {}", path.display())?,
            Ok(None) => {}
            Err(e) => writeln!(self.out, "Could not save take: {}", e)?,
        }
        Ok(())
    }

    fn on_tick(&mut self, outcome: TickOutcome) -> anyhow::Result<()> {
        match outcome {
            TickOutcome::Advanced(position) => trace!("Track position {:?}", position),
            TickOutcome::Finished => writeln!(self.out, "Track finished")?,
        }
        Ok(())
    }

    fn on_recorder_event(&mut self, event: RecorderEvent) -> anyhow::Result<()> {
        match event {
            RecorderEvent::Warning { remaining } => writeln!(
                self.out,
                "Warning: {} of recording time left",
                clock(remaining)
            )?,
            RecorderEvent::Completed { duration } => writeln!(
                self.out,
                "Take ready ({}). Type `save [file.wav]` to keep it.",
                clock(duration)
            )?,
            RecorderEvent::Failed(reason) => writeln!(self.out, "Recording failed: {}", reason)?,
        }
        Ok(())
    }

    fn on_scroll(&mut self, line: Option<String>) -> anyhow::Result<()> {
        match line {
            Some(line) => writeln!(self.out, "{}", line)?,
            None => writeln!(self.out, "-- end --")?,
        }
        Ok(())
    }

    fn report_transport(&mut self) -> anyhow::Result<()> {
        if self.player.track().is_none() {
            return Ok(());
        }
        let label = match self.player.status() {
            PlaybackStatus::Idle => return Ok(()),
            PlaybackStatus::Loaded => "Stopped",
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
        };
        writeln!(
            self.out,
            "{} {} / {}",
            label,
            clock(self.player.position()),
            clock(self.player.duration())
        )?;
        Ok(())
    }

    fn report_status(&mut self) -> anyhow::Result<()> {
        match self.prompter.song() {
            Some(song) => writeln!(
                self.out,
                "Song: {} (line {} of {}, speed {}{})",
                song.title(),
                self.prompter.current_line() + 1,
                song.lines().len(),
                self.prompter.speed(),
                if self.prompter.is_scrolling() { ", scrolling" } else { "" }
            )?,
            None => writeln!(self.out, "Song: none")?,
        }

        if self.player.track().is_some() {
            self.report_transport()?;
        } else {
            writeln!(self.out, "Track: none")?;
        }

        if self.recorder.is_capturing() {
            writeln!(self.out, "Recording in progress")?;
        } else if let Some(take) = self.recorder.captured() {
            writeln!(self.out, "Take ready ({})", clock(take.duration()))?;
        }
        Ok(())
    }
}

/// Format a duration as m:ss
fn clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
