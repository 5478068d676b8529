//! Backing track output using PipeWire
//!
//! Each `play` call spawns one output thread that streams the track from the
//! requested offset until it runs out of samples or its handle is stopped.
//! `play` waits until the stream is connected, so device failures reach the
//! caller instead of only the log.

use super::{AudioError, AudioSink, OutputHandle, PlayRequest};
use log::{debug, error};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

enum PlaybackCommand {
    Stop,
}

/// Plays tracks on the default PipeWire output
#[derive(Clone, Copy, Debug, Default)]
pub struct PipeWireSink;

impl AudioSink for PipeWireSink {
    fn play(&self, request: PlayRequest) -> Result<Box<dyn OutputHandle>, AudioError> {
        let (sender, receiver) = pw::channel::channel::<PlaybackCommand>();
        let (ready_tx, ready_rx) = sync_channel::<Result<(), String>>(1);

        let handle = thread::Builder::new()
            .name("couchguitar-playback".to_string())
            .spawn(move || {
                if let Err(e) = run_playback_loop(request, receiver, &ready_tx) {
                    error!("Playback error: {}", e);
                    let _ = ready_tx.try_send(Err(e));
                }
            })?;

        let output = PipeWireOutput {
            sender: Some(sender),
            thread_handle: Some(handle),
        };

        // Dropping `output` on the error path joins the finished thread
        wait_until_connected(&ready_rx)?;
        Ok(Box::new(output))
    }
}

/// Block until the output thread reports that its stream is connected
fn wait_until_connected(ready: &Receiver<Result<(), String>>) -> Result<(), AudioError> {
    match ready.recv() {
        Ok(result) => result.map_err(AudioError::Device),
        Err(_) => Err(AudioError::Device(
            "Playback thread exited before the stream connected".to_string(),
        )),
    }
}

/// Handle to one running PipeWire output thread
struct PipeWireOutput {
    sender: Option<pw::channel::Sender<PlaybackCommand>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl OutputHandle for PipeWireOutput {
    fn stop(&mut self) {
        // The loop may already have quit on its own, so a failed send is fine
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PlaybackCommand::Stop);
        }
    }
}

impl Drop for PipeWireOutput {
    fn drop(&mut self) {
        self.stop();

        // Blocks the caller only until the loop handles the Stop message
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Run the PipeWire playback loop in the output thread
fn run_playback_loop(
    request: PlayRequest,
    receiver: pw::channel::Receiver<PlaybackCommand>,
    ready: &SyncSender<Result<(), String>>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PlaybackCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        samples: Arc<[f32]>,
        cursor: usize,
        channels: usize,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    debug!(
        "Starting output at sample {} of {} ({} Hz, {} channel(s), {}-byte source samples)",
        request.offset,
        request.samples.len(),
        request.sample_rate,
        request.channels,
        request.sample_width
    );

    let user_data = UserData {
        samples: Arc::clone(&request.samples),
        cursor: request.offset.min(request.samples.len()),
        channels: request.channels.max(1) as usize,
        mainloop_weak: mainloop.downgrade(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Music",
        *pw::keys::APP_NAME => "Couchguitar",
    };

    let stream = pw::stream::StreamBox::new(&core, "couchguitar-playback", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, old, new| {
            debug!("Playback stream state: {:?} -> {:?}", old, new);
            if let pw::stream::StreamState::Error(reason) = new {
                error!("Playback stream failed: {}", reason);
                if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                    mainloop.quit();
                }
            }
        })
        .param_changed(|_, _, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            if let Ok((media_type, media_subtype)) = format_utils::parse_format(param) {
                if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                    log::warn!("Output negotiated a non-raw format");
                }
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
            let stride = std::mem::size_of::<f32>() * user_data.channels;

            let Some(slice) = data.data() else {
                return;
            };

            let remaining = user_data.samples.len() - user_data.cursor;
            if remaining == 0 {
                if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                    mainloop.quit();
                }
                return;
            }

            let n_frames = slice.len() / stride;
            let count = (n_frames * user_data.channels).min(remaining);
            let chunk = &user_data.samples[user_data.cursor..user_data.cursor + count];

            for (out, sample) in slice.chunks_exact_mut(4).zip(chunk) {
                out.copy_from_slice(&sample.to_le_bytes());
            }
            let written = count * std::mem::size_of::<f32>();
            slice[written..].fill(0);
            user_data.cursor += count;

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = written as u32;
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

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
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    let _ = ready.try_send(Ok(()));
    mainloop.run();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    #[test]
    fn test_connection_failures_reach_the_caller() {
        let (tx, rx) = sync_channel(1);
        tx.send(Ok(())).unwrap();
        assert!(wait_until_connected(&rx).is_ok());

        tx.send(Err("Failed to connect to PipeWire".to_string())).unwrap();
        match wait_until_connected(&rx) {
            Err(AudioError::Device(reason)) => assert!(reason.contains("connect")),
            other => panic!("expected a device error, got {:?}", other.err()),
        }

        drop(tx);
        assert!(matches!(wait_until_connected(&rx), Err(AudioError::Device(_))));
    }

    #[test]
    fn test_stop_signals_and_drop_waits_for_the_thread() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let _ = release_rx.recv();
            flag.store(true, Ordering::SeqCst);
        });

        let mut output = PipeWireOutput {
            sender: None,
            thread_handle: Some(handle),
        };
        output.stop();
        assert!(!finished.load(Ordering::SeqCst));

        drop(release_tx);
        drop(output);
        assert!(finished.load(Ordering::SeqCst));
    }
}
