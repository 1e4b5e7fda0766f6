//! Sound output. The session only ever talks to [`AudioBackend`]; the MIDI
//! port implementation, the silent fallback and the recorder used by tests
//! all sit behind it.

use std::sync::{Arc, Mutex};

use midir::{MidiOutput, MidiOutputConnection};

use crate::error::{KeyfallError, Result};
use crate::logging::Logger;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CONTROL_CHANGE: u8 = 0xB0;
const CC_CHANNEL_VOLUME: u8 = 7;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Fire-and-forget note output. Every call may fail on its own; callers log
/// the error and carry on.
pub trait AudioBackend {
    fn name(&self) -> &str;
    fn play(&mut self, pitch: u8, velocity: u8) -> Result<()>;
    fn stop(&mut self, pitch: u8) -> Result<()>;
    fn stop_all(&mut self) -> Result<()>;
    /// `volume` is within 0.0..=1.0
    fn set_master_volume(&mut self, volume: f32) -> Result<()>;
}

/// Scale 0.0..=1.0 onto the 7-bit controller range
pub fn volume_to_cc(volume: f32) -> u8 {
    (volume.clamp(0.0, 1.0) * 127.0).round() as u8
}

pub struct MidiOutBackend {
    conn: MidiOutputConnection,
    port_name: String,
    channel: u8,
}

impl MidiOutBackend {
    /// Connect to output port `port` (the first one when `None`)
    pub fn open(port: Option<usize>, channel: u8, log: &Logger) -> Result<Self> {
        let midi_out =
            MidiOutput::new("e_keyfall").map_err(|e| KeyfallError::AudioBackendUnavailable(e.to_string()))?;
        let ports = midi_out.ports();

        if ports.is_empty() {
            return Err(KeyfallError::AudioBackendUnavailable(
                "no MIDI output ports found".to_string(),
            ));
        }
        for (i, p) in ports.iter().enumerate() {
            let name = midi_out.port_name(p).unwrap_or_else(|_| "<Unknown>".to_string());
            log.debug(format_args!("MIDI port {i}: {name}"));
        }

        let index = port.unwrap_or(0);
        let selected = ports.get(index).ok_or_else(|| {
            KeyfallError::AudioBackendUnavailable(format!(
                "MIDI output port {index} does not exist ({} available)",
                ports.len()
            ))
        })?;
        let port_name = midi_out
            .port_name(selected)
            .unwrap_or_else(|_| "Unknown".to_string());
        let conn = midi_out
            .connect(selected, "e_keyfall")
            .map_err(|e| KeyfallError::AudioBackendUnavailable(e.to_string()))?;
        log.info(format_args!("connected to MIDI port: {port_name}"));

        Ok(MidiOutBackend {
            conn,
            port_name,
            channel: channel & 0x0F,
        })
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.conn
            .send(message)
            .map_err(|e| KeyfallError::AudioBackend(e.to_string()))
    }
}

impl AudioBackend for MidiOutBackend {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn play(&mut self, pitch: u8, velocity: u8) -> Result<()> {
        let msg = [NOTE_ON | self.channel, pitch & 0x7F, velocity & 0x7F];
        self.send(&msg)
    }

    fn stop(&mut self, pitch: u8) -> Result<()> {
        let msg = [NOTE_OFF | self.channel, pitch & 0x7F, 0];
        self.send(&msg)
    }

    fn stop_all(&mut self) -> Result<()> {
        // Try every channel even if one send fails
        let mut result = Ok(());
        for channel in 0..16u8 {
            if let Err(e) = self.send(&[CONTROL_CHANGE | channel, CC_ALL_NOTES_OFF, 0]) {
                result = Err(e);
            }
        }
        result
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        let value = volume_to_cc(volume);
        for channel in 0..16u8 {
            self.send(&[CONTROL_CHANGE | channel, CC_CHANNEL_VOLUME, value])?;
        }
        Ok(())
    }
}

impl Drop for MidiOutBackend {
    fn drop(&mut self) {
        let _ = self.stop_all();
    }
}

/// Used when no output could be opened: visuals keep running without sound
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBackend;

impl AudioBackend for SilentBackend {
    fn name(&self) -> &str {
        "silent"
    }

    fn play(&mut self, _pitch: u8, _velocity: u8) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self, _pitch: u8) -> Result<()> {
        Ok(())
    }

    fn stop_all(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_master_volume(&mut self, _volume: f32) -> Result<()> {
        Ok(())
    }
}

/// Open the configured MIDI port, or fall back to silence
pub fn open_backend(port: Option<usize>, channel: u8, log: &Logger) -> Box<dyn AudioBackend> {
    match MidiOutBackend::open(port, channel, log) {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            log.warn(format_args!("{e}; continuing without sound"));
            Box::new(SilentBackend)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioCall {
    Play { pitch: u8, velocity: u8 },
    Stop { pitch: u8 },
    StopAll,
    Volume(f32),
}

/// Keeps every call in a shared list. Clones share the list, so a test can
/// hand one clone to a session and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<AudioCall>>>,
    failing: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records calls but reports each one as failed
    pub fn failing() -> Self {
        RecordingBackend {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<AudioCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&mut self, call: AudioCall) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing {
            Err(KeyfallError::AudioBackend(format!("{call:?} rejected")))
        } else {
            Ok(())
        }
    }
}

impl AudioBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn play(&mut self, pitch: u8, velocity: u8) -> Result<()> {
        self.record(AudioCall::Play { pitch, velocity })
    }

    fn stop(&mut self, pitch: u8) -> Result<()> {
        self.record(AudioCall::Stop { pitch })
    }

    fn stop_all(&mut self) -> Result<()> {
        self.record(AudioCall::StopAll)
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        self.record(AudioCall::Volume(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_maps_onto_controller_range() {
        assert_eq!(volume_to_cc(0.0), 0);
        assert_eq!(volume_to_cc(1.0), 127);
        assert_eq!(volume_to_cc(0.5), 64);
        assert_eq!(volume_to_cc(7.0), 127);
        assert_eq!(volume_to_cc(-1.0), 0);
    }

    #[test]
    fn silent_backend_accepts_everything() {
        let mut backend = SilentBackend;
        assert!(backend.play(60, 100).is_ok());
        assert!(backend.stop(60).is_ok());
        assert!(backend.stop_all().is_ok());
        assert!(backend.set_master_volume(0.3).is_ok());
    }

    #[test]
    fn recording_clones_share_calls() {
        let recorder = RecordingBackend::new();
        let mut backend: Box<dyn AudioBackend> = Box::new(recorder.clone());
        backend.play(60, 90).unwrap();
        backend.stop(60).unwrap();
        backend.stop_all().unwrap();
        assert_eq!(
            recorder.calls(),
            vec![
                AudioCall::Play { pitch: 60, velocity: 90 },
                AudioCall::Stop { pitch: 60 },
                AudioCall::StopAll
            ]
        );
        recorder.clear();
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn failing_recorder_still_records() {
        let recorder = RecordingBackend::failing();
        let mut backend = recorder.clone();
        assert!(matches!(backend.play(60, 1), Err(KeyfallError::AudioBackend(_))));
        assert_eq!(recorder.calls().len(), 1);
    }
}
