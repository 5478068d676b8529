//! Mapping typed input lines to front-end commands

use std::path::PathBuf;
use std::time::Duration;

/// Messages from the input line to the controllers
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Show a text file in the prompter
    OpenSong(PathBuf),
    /// Show a bundled song; the first one when no name is given
    DemoSong(Option<String>),
    ListSongs,
    /// Load a WAV backing track
    LoadTrack(PathBuf),
    Play,
    Pause,
    Stop,
    Seek(Duration),
    StartRecording,
    StopRecording,
    /// Save the last take, to a generated name when no path is given
    SaveRecording(Option<PathBuf>),
    ToggleScroll,
    SetSpeed(u8),
    Status,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  open <file.txt>     show a song sheet
  demo [name]         show a bundled song
  songs               list bundled songs
  load <file.wav>     load a backing track
  play | pause | stop control the backing track
  seek <seconds>      jump within the backing track
  record              start a take (15 minutes max)
  finish              stop the running take
  save [file.wav]     save the last take
  scroll              start or stop auto-scroll
  speed <1-20>        set the scroll speed
  status              show what is loaded and running
  help                show this help
  quit                exit";

/// Parse one input line
///
/// Returns `None` for blank lines and for file commands whose path is empty,
/// which is how a cancelled file choice looks.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let path = || (!rest.is_empty()).then(|| PathBuf::from(rest));

    let command = match word.to_ascii_lowercase().as_str() {
        "" => return None,
        "open" => Command::OpenSong(path()?),
        "demo" => Command::DemoSong((!rest.is_empty()).then(|| rest.to_string())),
        "songs" => Command::ListSongs,
        "load" => Command::LoadTrack(path()?),
        "play" | "p" => Command::Play,
        "pause" => Command::Pause,
        "stop" | "s" => Command::Stop,
        "seek" => match rest.parse::<f64>().map(Duration::try_from_secs_f64) {
            Ok(Ok(to)) => Command::Seek(to),
            _ => Command::Unknown(line.to_string()),
        },
        "record" | "rec" => Command::StartRecording,
        "finish" => Command::StopRecording,
        "save" => Command::SaveRecording(path()),
        "scroll" => Command::ToggleScroll,
        "speed" => match rest.parse::<u32>() {
            Ok(speed) => Command::SetSpeed(speed.min(u8::MAX as u32) as u8),
            Err(_) => Command::Unknown(line.to_string()),
        },
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_transport_commands() {
        assert_eq!(parse("play"), Some(Command::Play));
        assert_eq!(parse("  PAUSE "), Some(Command::Pause));
        assert_eq!(parse("s"), Some(Command::Stop));
        assert_eq!(
            parse("seek 12.5"),
            Some(Command::Seek(Duration::from_millis(12_500)))
        );
        assert_eq!(parse("seek -3"), Some(Command::Unknown("seek -3".to_string())));
    }

    #[test]
    fn test_seek_rejects_out_of_range_values() {
        for input in ["seek 1e30", "seek inf", "seek NaN", "seek", "seek soon"] {
            assert_eq!(parse(input), Some(Command::Unknown(input.to_string())));
        }
    }

    #[test]
    fn test_paths_keep_spaces_and_empty_paths_are_cancelled() {
        assert_eq!(
            parse("load /tmp/my track.wav"),
            Some(Command::LoadTrack(PathBuf::from("/tmp/my track.wav")))
        );
        assert_eq!(parse("open"), None);
        assert_eq!(parse("load   "), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_save_and_demo_take_optional_arguments() {
        assert_eq!(parse("save"), Some(Command::SaveRecording(None)));
        assert_eq!(
            parse("save take.wav"),
            Some(Command::SaveRecording(Some(PathBuf::from("take.wav"))))
        );
        assert_eq!(parse("demo"), Some(Command::DemoSong(None)));
        assert_eq!(
            parse("demo oh_susanna"),
            Some(Command::DemoSong(Some("oh_susanna".to_string())))
        );
    }

    #[test]
    fn test_speed_saturates_and_rejects_garbage() {
        assert_eq!(parse("speed 7"), Some(Command::SetSpeed(7)));
        assert_eq!(parse("speed 4000"), Some(Command::SetSpeed(255)));
        assert_eq!(parse("speed fast"), Some(Command::Unknown("speed fast".to_string())));
        assert_eq!(parse("dance"), Some(Command::Unknown("dance".to_string())));
    }
}
