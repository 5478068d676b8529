//! Audio I/O for Couchguitar
//!
//! This module provides:
//! - The sink/source seams the controllers talk to
//! - PipeWire-backed microphone capture and track output
//! - WAV decoding of backing tracks and 16-bit export of takes via hound

mod capture;
mod playback;
mod recorder;
mod track;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use capture::PipeWireSource;
pub use playback::PipeWireSink;
pub use recorder::WavRecorder;
pub use track::PcmBuffer;

/// Errors raised by the audio layer
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture thread exited without delivering samples")]
    CaptureLost,
}

/// Everything an output sink needs to start a track at an offset
#[derive(Clone, Debug)]
pub struct PlayRequest {
    /// Interleaved samples of the whole track
    pub samples: Arc<[f32]>,
    /// Index of the first interleaved sample to play
    pub offset: usize,
    pub channels: u16,
    /// Bytes per sample in the source file
    pub sample_width: u16,
    pub sample_rate: u32,
}

/// A running output started by an [`AudioSink`]
pub trait OutputHandle {
    /// Stop the output; calling it twice is harmless
    fn stop(&mut self);
}

/// Something that can play raw PCM
pub trait AudioSink {
    fn play(&self, request: PlayRequest) -> Result<Box<dyn OutputHandle>, AudioError>;
}

/// Parameters for one blocking capture call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRequest {
    pub sample_rate: u32,
    pub channels: u16,
    /// Upper bound on frames a source should keep
    pub max_frames: usize,
}

/// Cancellation flag shared between a capture thread and its supervisor
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A microphone-like input
///
/// `record` blocks the calling thread until `stop` is raised or the device
/// fails, and returns the interleaved samples captured so far.
pub trait AudioSource: Send + Sync {
    fn record(&self, request: CaptureRequest, stop: &StopFlag) -> Result<Vec<f32>, AudioError>;
}
