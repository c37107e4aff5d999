// File utilities for the transcription client
//
// This module loads local audio files into memory for upload, guessing the
// MIME type from the file extension.

use log::info;
use std::fs;
use std::io;
use std::path::Path;

use crate::models::AudioFile;

/// Guess the MIME type of an audio file from its extension
///
/// # Arguments
///
/// * `path` - Path of the file
///
/// # Returns
///
/// * `Some(mime)` for known audio and video containers, `None` otherwise
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "webm" => "audio/webm",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

/// Read an audio file from disk
///
/// # Errors
///
/// Returns an IO error if the file cannot be read
pub fn read_audio_file(path: &Path) -> io::Result<AudioFile> {
    let data = fs::read(path)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    info!("Read {} ({} bytes)", path.display(), data.len());

    let mut file = AudioFile::new(name, data);
    file.content_type = guess_content_type(path).map(str::to_string);
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::process;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a/b.WAV")), Some("audio/wav"));
        assert_eq!(guess_content_type(Path::new("talk.mp3")), Some("audio/mpeg"));
        assert_eq!(guess_content_type(Path::new("notes.txt")), None);
        assert_eq!(guess_content_type(Path::new("noextension")), None);
    }

    #[test]
    fn test_read_audio_file() {
        let path = env::temp_dir().join(format!("relay_read_test_{}.flac", process::id()));
        fs::write(&path, b"fLaC").unwrap();

        let file = read_audio_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(file.size(), 4);
        assert_eq!(file.content_type.as_deref(), Some("audio/flac"));
        assert!(file.name.ends_with(".flac"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_audio_file(Path::new("/nonexistent/relay/audio.wav")).is_err());
    }
}
