//! Falling-notes MIDI visualizer: MIDI files become timed note intervals,
//! a speed-adjustable clock walks through them, and every frame selects
//! the notes to draw and the notes to sound.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod audio;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod keyboard;
pub mod logging;
pub mod midi_file;
pub mod piano;
pub mod selector;
pub mod session;
pub mod timeline;
pub mod tui;

pub use audio::{AudioBackend, MidiOutBackend, RecordingBackend, SilentBackend};
pub use clock::{ClockState, PlaybackClock};
pub use config::Config;
pub use error::{KeyfallError, Result};
pub use logging::Logger;
pub use midi_file::{load_song, Song, SongMetadata};
pub use selector::{RenderWindow, Trigger, TriggerResolver};
pub use session::{PlaybackSnapshot, Session, TransportCommand};
pub use timeline::{Hand, NoteInterval, Timeline, TimelineBuilder};

// Global shutdown flag for Ctrl+C handling
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn set_shutdown_flag() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub fn should_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// `1m05s` style, or `42s` below a minute
pub fn format_duration(ms: f64) -> String {
    let seconds = if ms.is_finite() && ms > 0.0 { (ms / 1000.0) as u64 } else { 0 };
    let minutes = seconds / 60;
    let remaining_seconds = seconds % 60;

    if minutes > 0 {
        format!("{}m{:02}s", minutes, remaining_seconds)
    } else {
        format!("{}s", remaining_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_formatted_compactly() {
        assert_eq!(format_duration(0.0), "0s");
        assert_eq!(format_duration(42_900.0), "42s");
        assert_eq!(format_duration(65_000.0), "1m05s");
        assert_eq!(format_duration(-3.0), "0s");
    }
}
