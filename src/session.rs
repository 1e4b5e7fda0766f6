//! One running piece: transport commands come in, snapshots go out, and
//! [`Session::tick`] runs the per-frame update in a fixed order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::audio::AudioBackend;
use crate::clock::{Advance, ClockState, PlaybackClock};
use crate::config::{Config, PlaybackConfig};
use crate::error::Result;
use crate::logging::Logger;
use crate::midi_file::{load_song, Song};
use crate::selector::{RenderWindow, Trigger, TriggerResolver};
use crate::timeline::{HandRules, Timeline};

/// Velocity used for notes played from the computer keyboard
pub const MANUAL_VELOCITY: u8 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    TogglePlay,
    Stop,
    Seek(f64),
    /// Relative seek, negative to rewind
    SeekBy(f64),
    SetSpeed(f64),
    SetVolume(f32),
    Load(PathBuf),
    SetHandDisplay(bool),
}

/// What the display needs after a command or frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub current_time_ms: f64,
    pub total_duration_ms: f64,
    pub is_playing: bool,
    pub state: ClockState,
    pub speed: f64,
    pub volume: f32,
    pub show_hands: bool,
    pub song_name: Option<String>,
    pub note_count: usize,
}

/// Result of one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameView {
    pub position_ms: f64,
    /// The piece ended during this frame
    pub finished: bool,
    /// Timeline indices of the notes to draw
    pub visible: Vec<usize>,
    pub triggers: Vec<Trigger>,
}

pub struct Session {
    song: Option<Song>,
    empty: Timeline,
    clock: PlaybackClock,
    resolver: TriggerResolver,
    window: RenderWindow,
    backend: Box<dyn AudioBackend>,
    playback: PlaybackConfig,
    rules: HandRules,
    volume: f32,
    show_hands: bool,
    held_keys: HashMap<u8, Instant>,
    log: Logger,
}

fn dispatch(backend: &mut dyn AudioBackend, triggers: &[Trigger], log: &Logger) {
    for trigger in triggers {
        let result = match *trigger {
            Trigger::Play { pitch, velocity, .. } => backend.play(pitch, velocity),
            Trigger::Stop { pitch, .. } => backend.stop(pitch),
        };
        if let Err(e) = result {
            log.warn(format_args!("{e}"));
        }
    }
}

impl Session {
    pub fn new(config: &Config, backend: Box<dyn AudioBackend>, log: Logger) -> Self {
        let playback = config.playback.clone();
        let mut session = Session {
            song: None,
            empty: Timeline::empty(),
            clock: PlaybackClock::new(0.0, log.child("clock")),
            resolver: TriggerResolver::new(playback.trigger_tolerance_ms),
            window: RenderWindow::from_config(&playback),
            backend,
            volume: playback.initial_volume.clamp(0.0, 1.0),
            playback,
            rules: HandRules::from_config(&config.hands),
            show_hands: true,
            held_keys: HashMap::new(),
            log,
        };
        let volume = session.volume;
        session.push_volume(volume);
        session
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    pub fn timeline(&self) -> &Timeline {
        self.song.as_ref().map_or(&self.empty, |s| &s.timeline)
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn window(&self) -> RenderWindow {
        self.window
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn show_hands(&self) -> bool {
        self.show_hands
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_time_ms: self.clock.position_ms(),
            total_duration_ms: self.clock.total_duration_ms(),
            is_playing: self.clock.is_playing(),
            state: self.clock.state(),
            speed: self.clock.speed(),
            volume: self.volume,
            show_hands: self.show_hands,
            song_name: self.song.as_ref().map(|s| s.name.clone()),
            note_count: self.timeline().len(),
        }
    }

    /// Pitches to highlight on the key bed: sounding notes and held keys
    pub fn active_pitches(&self) -> Vec<u8> {
        let mut pitches = self.resolver.sounding_pitches(self.timeline());
        pitches.extend(self.held_keys.keys().copied());
        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }

    /// Swap in a parsed song. The old one is silenced and dropped in one step.
    pub fn replace_song(&mut self, song: Song) {
        self.silence();
        self.clock.reset(song.timeline.total_duration_ms());
        self.log.info(format_args!(
            "{}: {} notes, {:.1}s",
            song.name,
            song.timeline.len(),
            song.timeline.total_duration_ms() / 1000.0
        ));
        if song.timeline.is_empty() {
            self.log.warn(format_args!("{} contains no notes", song.name));
        }
        self.song = Some(song);
    }

    /// Parse `path` and replace the current song. On failure nothing changes.
    pub fn load(&mut self, path: PathBuf) -> Result<()> {
        let song = load_song(&path, &self.rules, &self.log.child("midi"))?;
        self.replace_song(song);
        Ok(())
    }

    fn silence(&mut self) {
        self.resolver.reset();
        if let Err(e) = self.backend.stop_all() {
            self.log.warn(format_args!("{e}"));
        }
    }

    fn push_volume(&mut self, volume: f32) {
        if let Err(e) = self.backend.set_master_volume(volume) {
            self.log.warn(format_args!("{e}"));
        }
    }

    /// Sound whatever covers the current position after the clock starts
    /// or jumps while playing
    fn resync(&mut self) {
        let position = self.clock.position_ms();
        let timeline = match &self.song {
            Some(song) => &song.timeline,
            None => &self.empty,
        };
        let triggers = self.resolver.resync(timeline, position);
        dispatch(self.backend.as_mut(), &triggers, &self.log);
    }

    pub fn apply(&mut self, command: TransportCommand, now: Instant) -> Result<()> {
        match command {
            TransportCommand::Play => {
                if self.clock.start(now) {
                    self.resync();
                }
            }
            TransportCommand::Pause => {
                if self.clock.pause(now) {
                    self.silence();
                }
            }
            TransportCommand::TogglePlay => {
                let next = if self.clock.is_playing() {
                    TransportCommand::Pause
                } else {
                    TransportCommand::Play
                };
                return self.apply(next, now);
            }
            TransportCommand::Stop => {
                self.clock.stop();
                self.silence();
            }
            TransportCommand::Seek(target) => {
                self.clock.seek(now, target);
                if self.clock.is_playing() {
                    self.resync();
                } else {
                    self.resolver.reset();
                }
            }
            TransportCommand::SeekBy(delta) => {
                let target = self.clock.position_ms() + delta;
                return self.apply(TransportCommand::Seek(target), now);
            }
            TransportCommand::SetSpeed(speed) => {
                let speed = if speed.is_finite() {
                    speed.clamp(self.playback.min_speed, self.playback.max_speed)
                } else {
                    speed
                };
                self.clock.set_speed(now, speed);
            }
            TransportCommand::SetVolume(volume) => {
                self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { self.volume };
                let volume = self.volume;
                self.push_volume(volume);
                self.log.debug(format_args!("volume {:.0}%", volume * 100.0));
            }
            TransportCommand::Load(path) => self.load(path)?,
            TransportCommand::SetHandDisplay(show) => self.show_hands = show,
        }
        Ok(())
    }

    /// Advance the clock, fire note transitions, then select what to draw
    pub fn tick(&mut self, now: Instant) -> FrameView {
        let mut view = FrameView::default();
        let timeline = match &self.song {
            Some(song) => &song.timeline,
            None => &self.empty,
        };

        match self.clock.advance(now) {
            Advance::Playing(position) => {
                view.triggers = self.resolver.resolve(timeline, position);
                dispatch(self.backend.as_mut(), &view.triggers, &self.log);
            }
            Advance::Finished => {
                view.finished = true;
                self.resolver.reset();
                if let Err(e) = self.backend.stop_all() {
                    self.log.warn(format_args!("{e}"));
                }
            }
            Advance::Idle => {}
        }

        view.position_ms = self.clock.position_ms();
        view.visible = self.window.render_indices(timeline, view.position_ms);
        view
    }

    /// Strike `pitch` from the computer keyboard; a repeat only refreshes the hold
    pub fn press_key(&mut self, pitch: u8, now: Instant) {
        if self.held_keys.insert(pitch, now).is_none() {
            if let Err(e) = self.backend.play(pitch, MANUAL_VELOCITY) {
                self.log.warn(format_args!("{e}"));
            }
        }
    }

    pub fn release_key(&mut self, pitch: u8) {
        if self.held_keys.remove(&pitch).is_some() {
            if let Err(e) = self.backend.stop(pitch) {
                self.log.warn(format_args!("{e}"));
            }
        }
    }

    /// Release keys not refreshed within `hold`, for terminals that never
    /// report key releases
    pub fn release_stale_keys(&mut self, now: Instant, hold: Duration) {
        let stale: Vec<u8> = self
            .held_keys
            .iter()
            .filter(|(_, &pressed)| now.saturating_duration_since(pressed) >= hold)
            .map(|(&pitch, _)| pitch)
            .collect();
        for pitch in stale {
            self.release_key(pitch);
        }
    }

    /// Stop everything before exit
    pub fn shutdown(&mut self) {
        self.clock.stop();
        self.held_keys.clear();
        self.silence();
    }
}
