use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KeyfallError, Result};
use crate::timeline::Hand;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Full application configuration; every field has a default
pub struct Config {
    pub window: WindowConfig,
    pub playback: PlaybackConfig,
    pub hands: HandConfig,
    pub piano: PianoConfig,
    pub audio: AudioConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1200,
            height: 800,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Timing windows and transport step sizes
pub struct PlaybackConfig {
    /// How far ahead of the playhead notes start falling
    pub look_ahead_ms: f64,
    /// How long a finished note stays in the render set
    pub trailing_ms: f64,
    /// Late-frame allowance for triggering a note onset
    pub trigger_tolerance_ms: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub speed_step: f64,
    pub volume_step: f32,
    pub seek_step_ms: f64,
    pub initial_volume: f32,
    pub fps: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            look_ahead_ms: 3000.0,
            trailing_ms: 1000.0,
            trigger_tolerance_ms: 50.0,
            min_speed: 0.1,
            max_speed: 3.0,
            speed_step: 0.1,
            volume_step: 0.1,
            seek_step_ms: 5000.0,
            initial_volume: 1.0,
            fps: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    /// Explicit channel to hand mapping, consulted before the pitch split
    pub channel_map: BTreeMap<u8, Hand>,
    /// Pitches below this go to the left hand
    pub split_pitch: u8,
}

impl Default for HandConfig {
    fn default() -> Self {
        let mut channel_map = BTreeMap::new();
        channel_map.insert(0, Hand::Right);
        channel_map.insert(1, Hand::Left);
        HandConfig {
            channel_map,
            split_pitch: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Geometry of the drawn keyboard, in virtual pixels
pub struct PianoConfig {
    pub start_octave: u8,
    pub octaves: u8,
    pub fall_speed_px_per_ms: f64,
    pub white_key_width: f64,
    pub white_key_height: f64,
    pub black_key_width: f64,
    pub black_key_height: f64,
    pub bottom_margin: f64,
}

impl Default for PianoConfig {
    fn default() -> Self {
        PianoConfig {
            start_octave: 2,
            octaves: 5,
            fall_speed_px_per_ms: 0.1,
            white_key_width: 40.0,
            white_key_height: 150.0,
            black_key_width: 24.0,
            black_key_height: 100.0,
            bottom_margin: 100.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// MIDI output port index; the first port when unset
    pub midi_port: Option<usize>,
    /// Channel used for every note sent to the synthesizer
    pub channel: u8,
}

impl Config {
    /// Load a JSON config file; missing fields fall back to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text).map_err(|e| KeyfallError::Config {
            path: Some(path.to_path_buf()),
            reason: e.to_string(),
        })?;
        config.validate().map_err(|reason| KeyfallError::Config {
            path: Some(path.to_path_buf()),
            reason,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        let p = &self.playback;
        if !(p.min_speed > 0.0) {
            return Err(format!("min_speed must be positive, got {}", p.min_speed));
        }
        if p.max_speed < p.min_speed {
            return Err(format!(
                "max_speed {} is below min_speed {}",
                p.max_speed, p.min_speed
            ));
        }
        if !(0.0..=1.0).contains(&p.initial_volume) {
            return Err(format!(
                "initial_volume must be within 0.0..=1.0, got {}",
                p.initial_volume
            ));
        }
        if p.look_ahead_ms < 0.0 || p.trailing_ms < 0.0 || p.trigger_tolerance_ms < 0.0 {
            return Err("timing windows must not be negative".to_string());
        }
        if p.fps == 0 {
            return Err("fps must be at least 1".to_string());
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err("window dimensions must be positive".to_string());
        }
        if self.piano.octaves == 0 {
            return Err("piano needs at least one octave".to_string());
        }
        if self.audio.channel > 15 {
            return Err(format!("audio channel {} is out of range", self.audio.channel));
        }
        if self.hands.channel_map.keys().any(|&ch| ch > 15) {
            return Err("hand channel map contains a channel above 15".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.window.width, 1200);
        assert_eq!(config.window.height, 800);
        assert_eq!(config.playback.look_ahead_ms, 3000.0);
        assert_eq!(config.playback.trailing_ms, 1000.0);
        assert_eq!(config.playback.trigger_tolerance_ms, 50.0);
        assert_eq!(config.hands.channel_map.get(&0), Some(&Hand::Right));
        assert_eq!(config.hands.channel_map.get(&1), Some(&Hand::Left));
        assert_eq!(config.hands.split_pitch, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let json = r#"{ "playback": { "look_ahead_ms": 1500.0 }, "hands": { "channel_map": { "3": "left" } } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.playback.look_ahead_ms, 1500.0);
        assert_eq!(config.playback.trailing_ms, 1000.0);
        assert_eq!(config.hands.channel_map.len(), 1);
        assert_eq!(config.hands.channel_map.get(&3), Some(&Hand::Left));
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn rejects_non_positive_speed() {
        let mut config = Config::default();
        config.playback.min_speed = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_speed_range() {
        let mut config = Config::default();
        config.playback.max_speed = 0.05;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_the_path_of_a_broken_file() {
        let path = std::env::temp_dir().join(format!("e_keyfall_cfg_{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        let err = Config::load(&path).unwrap_err();
        match err {
            KeyfallError::Config { path: Some(p), .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
        let _ = fs::remove_file(&path);
    }
}
