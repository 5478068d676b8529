//! Controllers behind the front end
//!
//! - Playback of a single backing track with tick-based position tracking
//! - Timed microphone takes with a warning before the cap

mod playback;
mod recording;

pub use playback::{PlaybackController, PlaybackStatus, TickOutcome};
pub use recording::{Recorder, RecorderConfig, RecorderEvent};
