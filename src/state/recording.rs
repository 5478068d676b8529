//! Timed microphone takes
//!
//! A take runs on its own capture thread. A supervising task owns the warning
//! and deadline timers, stops the thread when either the deadline passes or
//! the user finishes early, and hands the samples back over a channel.

use crate::audio::{AudioError, AudioSource, CaptureRequest, StopFlag, WavRecorder};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};

/// Capture parameters for a take
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecorderConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Hard cap on the length of a take
    pub max_duration: Duration,
    /// When to warn that the cap is near
    pub warn_after: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            max_duration: Duration::from_secs(15 * 60),
            warn_after: Duration::from_secs(14 * 60),
        }
    }
}

impl RecorderConfig {
    fn max_frames(&self) -> usize {
        (self.max_duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }
}

/// A finished take
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedAudio {
    /// Interleaved samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CapturedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Drop anything captured after `elapsed`
    fn truncate_to(&mut self, elapsed: Duration) {
        let frames = (elapsed.as_secs_f64() * self.sample_rate as f64).round() as usize;
        self.samples.truncate(frames * self.channels as usize);
    }
}

/// Notifications delivered to the event loop
#[derive(Clone, Debug, PartialEq)]
pub enum RecorderEvent {
    /// The take is close to its cap
    Warning { remaining: Duration },
    /// The take finished and its buffer is stored in the recorder
    Completed { duration: Duration },
    Failed(String),
}

/// Messages from the supervisor task
enum SessionMessage {
    Warning { remaining: Duration },
    Finished(Result<CapturedAudio, AudioError>),
}

/// Owns the take currently being captured and the last finished one
pub struct Recorder {
    config: RecorderConfig,
    source: Arc<dyn AudioSource>,
    writer: WavRecorder,
    tx: mpsc::UnboundedSender<SessionMessage>,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    stop_tx: Option<oneshot::Sender<()>>,
    /// Set from start until the take is handed back, even after a stop request
    capturing: bool,
    captured: Option<CapturedAudio>,
}

impl Recorder {
    pub fn new(config: RecorderConfig, source: Arc<dyn AudioSource>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = WavRecorder::new(config.sample_rate, config.channels);
        Self {
            config,
            source,
            writer,
            tx,
            rx,
            stop_tx: None,
            capturing: false,
            captured: None,
        }
    }

    /// Set where generated take names are placed
    pub fn with_recordings_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.writer.set_recordings_dir(dir);
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// The last finished take, if any
    pub fn captured(&self) -> Option<&CapturedAudio> {
        self.captured.as_ref()
    }

    /// Begin a new take
    ///
    /// Discards the previous take. Returns `false` when a take is already
    /// running. Must be called from within a Tokio runtime.
    pub fn start_capture(&mut self) -> bool {
        if self.is_capturing() {
            warn!("A take is already being recorded");
            return false;
        }

        self.captured = None;
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);
        self.capturing = true;

        tokio::spawn(supervise(
            self.config.clone(),
            Arc::clone(&self.source),
            stop_rx,
            self.tx.clone(),
        ));

        info!(
            "Recording started (max {}s, warning at {}s)",
            self.config.max_duration.as_secs(),
            self.config.warn_after.as_secs()
        );
        true
    }

    /// Finish the running take early
    pub fn stop_capture(&mut self) {
        match self.stop_tx.take() {
            Some(stop_tx) => {
                // The supervisor may have finished on its own already
                let _ = stop_tx.send(());
                info!("Recording stopped");
            }
            None => debug!("stop ignored: not recording"),
        }
    }

    /// Wait for the next notification from the running take
    ///
    /// A completed take is stored before its notification is returned.
    pub async fn next_event(&mut self) -> RecorderEvent {
        // The recorder keeps a sender alive, so the channel never closes
        let Some(message) = self.rx.recv().await else {
            return std::future::pending().await;
        };

        match message {
            SessionMessage::Warning { remaining } => RecorderEvent::Warning { remaining },
            SessionMessage::Finished(result) => {
                self.stop_tx = None;
                self.capturing = false;
                match result {
                    Ok(capture) => {
                        let duration = capture.duration();
                        info!("Take captured: {:.1}s", duration.as_secs_f64());
                        self.captured = Some(capture);
                        RecorderEvent::Completed { duration }
                    }
                    Err(e) => {
                        error!("Recording failed: {}", e);
                        RecorderEvent::Failed(e.to_string())
                    }
                }
            }
        }
    }

    /// Write the last take to `path` as normalized 16-bit PCM
    ///
    /// Returns `Ok(false)` without touching the filesystem when there is no
    /// take to save.
    pub fn save_capture(&self, path: impl AsRef<Path>) -> Result<bool, AudioError> {
        let Some(capture) = &self.captured else {
            debug!("save ignored: nothing captured");
            return Ok(false);
        };
        self.writer.save(&capture.samples, path.as_ref())?;
        Ok(true)
    }

    /// Write the last take under a generated name in the recordings directory
    pub fn save_capture_default(&self) -> Result<Option<PathBuf>, AudioError> {
        match &self.captured {
            Some(capture) => self.writer.save_generated(&capture.samples).map(Some),
            None => {
                debug!("save ignored: nothing captured");
                Ok(None)
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

/// Releases the capture thread if the supervisor goes away mid-take
struct StopOnDrop(StopFlag);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.raise();
    }
}

/// Drive one take from start to hand-off
async fn supervise(
    config: RecorderConfig,
    source: Arc<dyn AudioSource>,
    mut stop_rx: oneshot::Receiver<()>,
    tx: mpsc::UnboundedSender<SessionMessage>,
) {
    let request = CaptureRequest {
        sample_rate: config.sample_rate,
        channels: config.channels,
        max_frames: config.max_frames(),
    };
    let stop = StopOnDrop(StopFlag::new());
    let (done_tx, mut done_rx) = oneshot::channel();

    let thread_stop = stop.0.clone();
    let spawned = thread::Builder::new()
        .name("couchguitar-capture".to_string())
        .spawn(move || {
            let result = source.record(request, &thread_stop);
            let _ = done_tx.send(result);
        });
    if let Err(e) = spawned {
        let _ = tx.send(SessionMessage::Finished(Err(AudioError::Io(e))));
        return;
    }

    let started = Instant::now();
    let warning = sleep(config.warn_after);
    let deadline = sleep(config.max_duration);
    tokio::pin!(warning, deadline);
    let mut warned = config.warn_after >= config.max_duration;

    let early = loop {
        tokio::select! {
            _ = &mut warning, if !warned => {
                warned = true;
                let remaining = config.max_duration - config.warn_after;
                info!("{}s of recording time left", remaining.as_secs());
                let _ = tx.send(SessionMessage::Warning { remaining });
            }
            _ = &mut deadline => {
                info!("Maximum recording time reached");
                break None;
            }
            // A dropped sender counts as a stop request too
            _ = &mut stop_rx => break None,
            result = &mut done_rx => break Some(result),
        }
    };
    let elapsed = started.elapsed().min(config.max_duration);

    let result = match early {
        Some(result) => result,
        None => {
            stop.0.raise();
            done_rx.await
        }
    };

    let outcome = match result {
        Ok(Ok(samples)) => {
            let mut capture = CapturedAudio {
                samples,
                sample_rate: config.sample_rate,
                channels: config.channels,
            };
            capture.truncate_to(elapsed);
            Ok(capture)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(AudioError::CaptureLost),
    };
    let _ = tx.send(SessionMessage::Finished(outcome));
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 100;

    /// Produces a full-length take once it is told to stop
    struct HeldSource {
        level: f32,
    }

    impl AudioSource for HeldSource {
        fn record(&self, request: CaptureRequest, stop: &StopFlag) -> Result<Vec<f32>, AudioError> {
            while !stop.is_raised() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(vec![self.level; request.max_frames * request.channels as usize])
        }
    }

    struct BrokenSource;

    impl AudioSource for BrokenSource {
        fn record(&self, _: CaptureRequest, _: &StopFlag) -> Result<Vec<f32>, AudioError> {
            Err(AudioError::Device("no microphone".to_string()))
        }
    }

    fn config() -> RecorderConfig {
        RecorderConfig {
            sample_rate: RATE,
            channels: 1,
            ..RecorderConfig::default()
        }
    }

    fn recorder() -> Recorder {
        Recorder::new(config(), Arc::new(HeldSource { level: 0.25 }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninterrupted_take_warns_then_completes_at_cap() {
        let mut recorder = recorder();
        let started = Instant::now();
        assert!(recorder.start_capture());

        let event = recorder.next_event().await;
        assert_eq!(
            event,
            RecorderEvent::Warning {
                remaining: Duration::from_secs(60)
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(840));

        let event = recorder.next_event().await;
        assert_eq!(
            event,
            RecorderEvent::Completed {
                duration: Duration::from_secs(900)
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(900));
        assert!(!recorder.is_capturing());
        assert_eq!(recorder.captured().unwrap().frames(), 900 * RATE as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_stop_keeps_elapsed_time_without_warning() {
        let mut recorder = recorder();
        recorder.start_capture();

        sleep(Duration::from_secs(120)).await;
        recorder.stop_capture();

        let event = recorder.next_event().await;
        assert_eq!(
            event,
            RecorderEvent::Completed {
                duration: Duration::from_secs(120)
            }
        );
        assert_eq!(recorder.captured().unwrap().frames(), 120 * RATE as usize);

        let more = tokio::time::timeout(Duration::from_secs(3600), recorder.next_event()).await;
        assert!(more.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_ignored_while_capturing() {
        let mut recorder = recorder();
        assert!(recorder.start_capture());
        assert!(!recorder.start_capture());
        recorder.stop_capture();
        assert!(matches!(
            recorder.next_event().await,
            RecorderEvent::Completed { .. }
        ));
        assert!(recorder.start_capture());
        assert!(recorder.captured().is_none());
        recorder.stop_capture();
    }

    #[tokio::test]
    async fn test_stop_and_save_without_take_are_noops() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder().with_recordings_dir(dir.path());

        recorder.stop_capture();
        let path = dir.path().join("take.wav");
        assert!(!recorder.save_capture(&path).unwrap());
        assert!(!path.exists());
        assert!(recorder.save_capture_default().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_device_failure_is_reported() {
        let mut recorder = Recorder::new(config(), Arc::new(BrokenSource));
        recorder.start_capture();

        match recorder.next_event().await {
            RecorderEvent::Failed(reason) => assert!(reason.contains("no microphone")),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(recorder.captured().is_none());
        assert!(!recorder.is_capturing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_take_is_peak_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder();
        recorder.start_capture();
        sleep(Duration::from_secs(2)).await;
        recorder.stop_capture();
        recorder.next_event().await;

        let path = dir.path().join("take.wav");
        assert!(recorder.save_capture(&path).unwrap());

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, RATE);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 2 * RATE as usize);
        assert!(samples.iter().all(|&s| s == i16::MAX));
    }
}
