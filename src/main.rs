//! Couchguitar - a teleprompter for musicians
//!
//! Shows song sheets with auto-scroll, plays a WAV backing track and records
//! short takes from the microphone.

mod app;
mod assets;
mod audio;
mod cli;
mod commands;
mod prompter;
mod state;

use app::App;
use audio::{PipeWireSink, PipeWireSource};
use clap::Parser;
use commands::Command;
use log::info;
use state::RecorderConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    info!("Starting Couchguitar");

    let mut app = App::new(
        PipeWireSink,
        Arc::new(PipeWireSource),
        RecorderConfig::default(),
        std::io::stdout(),
    );
    if let Some(dir) = &args.recordings_dir {
        app = app.with_recordings_dir(dir);
    }

    if let Some(song) = args.song {
        app.handle(Command::OpenSong(song))?;
    }
    if let Some(track) = args.track {
        app.handle(Command::LoadTrack(track))?;
    }

    app.run().await
}
