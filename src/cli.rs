//! Command-line interface for Couchguitar
//!
//! Handles argument parsing and logging configuration.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// Couchguitar - scrolling song sheets, backing tracks and short takes
#[derive(Parser, Debug)]
#[command(name = "couchguitar")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = all deps
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Song sheet to show at startup
    #[arg(long)]
    pub song: Option<PathBuf>,

    /// WAV backing track to load at startup
    #[arg(long)]
    pub track: Option<PathBuf>,

    /// Directory for takes saved without an explicit path
    #[arg(long)]
    pub recordings_dir: Option<PathBuf>,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Keep dependencies quiet unless asked for everything
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("couchguitar", args.log_level());

    if args.verbose >= 4 {
        builder.filter_level(args.log_level());
    }

    builder.format_timestamp_millis().init();
}
