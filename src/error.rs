//! Error types for loading, playback and the terminal front end

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyfallError {
    /// The requested MIDI file does not exist
    #[error("MIDI file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The decoder rejected the file; the reason is passed through untouched
    #[error("Malformed MIDI file {}: {reason}", path.display())]
    MalformedMidi { path: PathBuf, reason: String },

    /// No audio output could be opened
    #[error("Audio backend unavailable: {0}")]
    AudioBackendUnavailable(String),

    /// A single play/stop/volume call failed
    #[error("Audio backend error: {0}")]
    AudioBackend(String),

    #[error("Invalid configuration {}: {reason}", path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<defaults>".to_string()))]
    Config {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KeyfallError>;
