//! Microphone capture using PipeWire

use super::{AudioError, AudioSource, CaptureRequest, StopFlag};
use log::{debug, info, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How often the capture loop checks whether it has been asked to stop
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Records from the default PipeWire input
#[derive(Clone, Copy, Debug, Default)]
pub struct PipeWireSource;

impl AudioSource for PipeWireSource {
    fn record(&self, request: CaptureRequest, stop: &StopFlag) -> Result<Vec<f32>, AudioError> {
        info!(
            "Opening microphone: {} Hz, {} channel(s)",
            request.sample_rate, request.channels
        );
        let samples = run_capture_loop(request, stop.clone()).map_err(AudioError::Device)?;
        debug!("Capture loop finished with {} samples", samples.len());
        Ok(samples)
    }
}

/// Run the PipeWire capture loop on the current thread until stopped
fn run_capture_loop(request: CaptureRequest, stop: StopFlag) -> Result<Vec<f32>, String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    // Quit the loop once the supervisor raises the stop flag
    let mainloop_weak = mainloop.downgrade();
    let timer = mainloop.loop_().add_timer(move |_| {
        if stop.is_raised() {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });
    timer
        .update_timer(Some(STOP_POLL_INTERVAL), Some(STOP_POLL_INTERVAL))
        .into_result()
        .map_err(|e| format!("Failed to arm stop timer: {}", e))?;

    // Written by the realtime process callback, read once the stream is gone
    let captured = Arc::new(Mutex::new(Vec::<f32>::new()));
    let failure = Arc::new(Mutex::new(None::<String>));
    let max_samples = request.max_frames * request.channels as usize;

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        requested: (u32, u32),
        captured: Arc<Mutex<Vec<f32>>>,
        failure: Arc<Mutex<Option<String>>>,
        max_samples: usize,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let user_data = UserData {
        format: Default::default(),
        requested: (request.sample_rate, request.channels as u32),
        captured: Arc::clone(&captured),
        failure: Arc::clone(&failure),
        max_samples,
        mainloop_weak: mainloop.downgrade(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Music",
        *pw::keys::APP_NAME => "Couchguitar",
    };

    let stream = pw::stream::StreamBox::new(&core, "couchguitar-capture", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, old, new| {
            debug!("Capture stream state: {:?} -> {:?}", old, new);
            if let pw::stream::StreamState::Error(reason) = new {
                if let Ok(mut failure) = user_data.failure.lock() {
                    failure.get_or_insert(format!("Capture stream failed: {}", reason));
                }
                if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                    mainloop.quit();
                }
            }
        })
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }

            if user_data.format.parse(param).is_err() {
                warn!("Ignoring unparsable capture format");
                return;
            }

            let negotiated = (user_data.format.rate(), user_data.format.channels());
            info!(
                "Microphone negotiated {} Hz, {} channel(s)",
                negotiated.0, negotiated.1
            );
            if negotiated != user_data.requested {
                warn!(
                    "Requested {} Hz, {} channel(s); the take will be labelled with the requested format",
                    user_data.requested.0, user_data.requested.1
                );
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let size = data.chunk().size() as usize;

            let Some(raw) = data.data() else {
                return;
            };

            let Ok(mut captured) = user_data.captured.lock() else {
                return;
            };
            let room = user_data.max_samples.saturating_sub(captured.len());
            captured.extend(
                raw[..size.min(raw.len())]
                    .chunks_exact(std::mem::size_of::<f32>())
                    .take(room)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );

            if captured.len() >= user_data.max_samples {
                if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                    mainloop.quit();
                }
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    // Ask for interleaved F32LE at the session's rate and channel count
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(request.sample_rate);
    audio_info.set_channels(request.channels as u32);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values).ok_or("Failed to build format pod")?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    mainloop.run();

    // Disconnect before touching the buffer the process callback fills
    drop(listener);
    drop(stream);

    take_samples(&captured, &failure)
}

/// Hand back what was captured, unless the stream reported an error
fn take_samples(
    captured: &Mutex<Vec<f32>>,
    failure: &Mutex<Option<String>>,
) -> Result<Vec<f32>, String> {
    if let Some(reason) = failure.lock().ok().and_then(|mut f| f.take()) {
        return Err(reason);
    }

    captured
        .lock()
        .map(|mut captured| std::mem::take(&mut *captured))
        .map_err(|_| "Capture buffer was poisoned".to_string())
}
