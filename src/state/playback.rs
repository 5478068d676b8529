//! Backing track transport
//!
//! Tracks playback progress by counting fixed ticks while the track plays.
//! The count is not read back from the device, so it can drift from what is
//! actually heard; it only drives the progress display and resume offsets.

use crate::audio::{AudioError, AudioSink, OutputHandle, PcmBuffer, PlayRequest};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};

/// How often the position tracker advances while playing
pub const PLAYBACK_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// Nothing loaded
    #[default]
    Idle,
    Loaded,
    Playing,
    Paused,
}

/// Result of one position tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced(Duration),
    /// The tracked position reached the end of the track
    Finished,
}

/// Load/play/pause/stop/seek over a single decoded track
pub struct PlaybackController<S: AudioSink> {
    sink: S,
    track: Option<PcmBuffer>,
    status: PlaybackStatus,
    /// Position folded in at the last pause or seek
    position: Duration,
    /// Time accumulated by ticks since output last started
    since_start: Duration,
    output: Option<Box<dyn OutputHandle>>,
    ticker: Option<Interval>,
}

impl<S: AudioSink> PlaybackController<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            track: None,
            status: PlaybackStatus::Idle,
            position: Duration::ZERO,
            since_start: Duration::ZERO,
            output: None,
            ticker: None,
        }
    }

    /// Decode a WAV file and make it the current track
    ///
    /// On a decode error the previous track stays loaded.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), AudioError> {
        let track = PcmBuffer::open(path.as_ref())?;
        info!(
            "Loaded {} ({:.1}s, {} Hz, {} channel(s))",
            path.as_ref().display(),
            track.duration().as_secs_f64(),
            track.sample_rate(),
            track.channels()
        );
        self.load_buffer(track);
        Ok(())
    }

    pub fn load_buffer(&mut self, track: PcmBuffer) {
        self.halt();
        self.track = Some(track);
        self.position = Duration::ZERO;
        self.status = PlaybackStatus::Loaded;
    }

    /// Start or resume output
    ///
    /// Resumes at the stored position when paused, otherwise starts at the
    /// beginning. Does nothing while already playing.
    pub fn play(&mut self) -> Result<(), AudioError> {
        if self.track.is_none() {
            debug!("play ignored: no track loaded");
            return Ok(());
        }

        match self.status {
            PlaybackStatus::Playing => {
                debug!("play ignored: already playing");
                return Ok(());
            }
            PlaybackStatus::Paused => {}
            PlaybackStatus::Idle | PlaybackStatus::Loaded => self.position = Duration::ZERO,
        }

        self.start_output()
    }

    /// Stop output and freeze the position marker
    pub fn pause(&mut self) {
        if self.status != PlaybackStatus::Playing {
            debug!("pause ignored: not playing");
            return;
        }

        self.halt();
        self.status = PlaybackStatus::Paused;
        debug!("Paused at {:?}", self.position);
    }

    /// Stop output and rewind to the start
    pub fn stop(&mut self) {
        if self.track.is_none() {
            debug!("stop ignored: no track loaded");
            return;
        }

        self.halt();
        self.position = Duration::ZERO;
        self.status = PlaybackStatus::Loaded;
    }

    /// Move the position marker, clamped to the track length
    ///
    /// While playing, output restarts at the new position. A loaded track is
    /// cued and waits paused at the new position.
    pub fn seek(&mut self, to: Duration) -> Result<(), AudioError> {
        let Some(track) = &self.track else {
            debug!("seek ignored: no track loaded");
            return Ok(());
        };
        let to = to.min(track.duration());

        match self.status {
            PlaybackStatus::Playing => {
                self.halt();
                self.position = to;
                let result = self.start_output();
                if result.is_err() {
                    // No output is running, so the track waits at the target
                    self.status = PlaybackStatus::Paused;
                }
                result
            }
            PlaybackStatus::Paused | PlaybackStatus::Loaded => {
                self.position = to;
                self.status = PlaybackStatus::Paused;
                Ok(())
            }
            PlaybackStatus::Idle => Ok(()),
        }
    }

    /// Advance the tracker by one tick
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != PlaybackStatus::Playing {
            return TickOutcome::Advanced(self.position());
        }

        self.since_start += PLAYBACK_TICK;

        let duration = self.duration();
        if self.position() >= duration {
            info!("Track finished after {:.1}s", duration.as_secs_f64());
            self.halt();
            self.position = Duration::ZERO;
            self.status = PlaybackStatus::Loaded;
            return TickOutcome::Finished;
        }

        TickOutcome::Advanced(self.position())
    }

    /// Wait for the next tick and apply it
    ///
    /// Never resolves unless the controller is playing, so it can sit in a
    /// `select!` next to other event sources.
    pub async fn next_tick(&mut self) -> TickOutcome {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
        self.tick()
    }

    /// Elapsed position into the track
    pub fn position(&self) -> Duration {
        self.position + self.since_start
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn track(&self) -> Option<&PcmBuffer> {
        self.track.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.track
            .as_ref()
            .map(PcmBuffer::duration)
            .unwrap_or_default()
    }

    fn start_output(&mut self) -> Result<(), AudioError> {
        let Some(track) = &self.track else {
            return Ok(());
        };

        let request = PlayRequest {
            samples: Arc::clone(track.samples()),
            offset: track.sample_offset(self.position),
            channels: track.channels(),
            sample_width: track.sample_width(),
            sample_rate: track.sample_rate(),
        };
        debug!("Starting output at {:?}", self.position);

        self.output = Some(self.sink.play(request)?);
        self.since_start = Duration::ZERO;
        self.ticker = Some(interval_at(Instant::now() + PLAYBACK_TICK, PLAYBACK_TICK));
        self.status = PlaybackStatus::Playing;
        Ok(())
    }

    /// Stop the device, fold ticked time into the marker and halt the tick
    fn halt(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
        self.ticker = None;
        self.position += self.since_start;
        self.since_start = Duration::ZERO;
    }
}

impl<S: AudioSink> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.halt();
    }
}
