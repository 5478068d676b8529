//! Demo songs bundled into the binary using rust_embed

use crate::prompter::Song;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "songs"]
pub struct DemoSongs;

impl DemoSongs {
    /// Names of the bundled songs, without the `.txt` extension, sorted
    pub fn names() -> Vec<String> {
        let mut names: Vec<String> = Self::iter()
            .filter_map(|p| p.strip_suffix(".txt").map(str::to_string))
            .collect();
        names.sort();
        names
    }

    /// Open a bundled song by name
    pub fn song(name: &str) -> Option<Song> {
        let file = Self::get(&format!("{}.txt", name))?;
        let text = String::from_utf8_lossy(&file.data);
        Some(Song::from_text(name, &text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_songs_are_listed_and_open() {
        let names = DemoSongs::names();
        assert!(names.contains(&"amazing_grace".to_string()));

        for name in &names {
            let song = DemoSongs::song(name).unwrap();
            assert!(!song.lines().is_empty());
        }
        assert!(DemoSongs::song("no_such_song").is_none());
    }
}
