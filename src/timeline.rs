//! Conversion of decoded MIDI track events into a flat list of timed notes.
//!
//! Ticks are turned into milliseconds with the tempo that is current when a
//! note closes, and that single tempo is used for both endpoints. Pieces
//! with a tempo change between a note's on and off events therefore get an
//! approximate onset.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::HandConfig;
use crate::logging::Logger;

/// 120 BPM
pub const DEFAULT_TEMPO_USEC_PER_BEAT: u32 = 500_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
    #[default]
    Unknown,
}

impl Hand {
    pub fn label(self) -> &'static str {
        match self {
            Hand::Left => "left",
            Hand::Right => "right",
            Hand::Unknown => "unknown",
        }
    }
}

/// A note's sounding span. Only `hand` may change after the timeline is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteInterval {
    pub pitch: u8,
    pub velocity: u8,
    pub start_time_ms: f64,
    pub end_time_ms: f64,
    pub channel: u8,
    pub hand: Hand,
    pub track_index: usize,
}

impl NoteInterval {
    pub fn duration_ms(&self) -> f64 {
        self.end_time_ms - self.start_time_ms
    }

    /// Half-open: a note is no longer sounding at its end time
    pub fn contains(&self, time_ms: f64) -> bool {
        self.start_time_ms <= time_ms && time_ms < self.end_time_ms
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// New microseconds-per-beat value
    Tempo(u32),
    NoteOn { pitch: u8, velocity: u8, channel: u8 },
    NoteOff { pitch: u8, channel: u8 },
    /// Anything else; only its delta matters
    Other,
}

/// One decoded event with its tick delta from the previous event of the track
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta: u32,
    pub kind: EventKind,
}

impl TrackEvent {
    pub fn tempo(delta: u32, usec_per_beat: u32) -> Self {
        TrackEvent {
            delta,
            kind: EventKind::Tempo(usec_per_beat),
        }
    }

    pub fn note_on(delta: u32, pitch: u8, velocity: u8, channel: u8) -> Self {
        TrackEvent {
            delta,
            kind: EventKind::NoteOn {
                pitch,
                velocity,
                channel,
            },
        }
    }

    pub fn note_off(delta: u32, pitch: u8, channel: u8) -> Self {
        TrackEvent {
            delta,
            kind: EventKind::NoteOff { pitch, channel },
        }
    }

    pub fn other(delta: u32) -> Self {
        TrackEvent {
            delta,
            kind: EventKind::Other,
        }
    }
}

/// `ms = (ticks / ticks_per_beat) * (tempo / 1000)`
pub fn ticks_to_ms(ticks: u64, ticks_per_beat: u16, tempo_usec_per_beat: u32) -> f64 {
    (ticks as f64 / f64::from(ticks_per_beat.max(1))) * (f64::from(tempo_usec_per_beat) / 1000.0)
}

/// Hand assignment cascade: explicit channel map first, then the pitch split
#[derive(Clone, Debug, PartialEq)]
pub struct HandRules {
    pub channel_map: BTreeMap<u8, Hand>,
    pub split_pitch: u8,
}

impl Default for HandRules {
    fn default() -> Self {
        HandRules::from_config(&HandConfig::default())
    }
}

impl HandRules {
    pub fn from_config(config: &HandConfig) -> Self {
        HandRules {
            channel_map: config.channel_map.clone(),
            split_pitch: config.split_pitch,
        }
    }

    pub fn classify(&self, channel: u8, pitch: u8) -> Hand {
        match self.channel_map.get(&channel) {
            Some(&hand) if hand != Hand::Unknown => hand,
            _ => hand_for_pitch(pitch, self.split_pitch),
        }
    }
}

fn hand_for_pitch(pitch: u8, split_pitch: u8) -> Hand {
    if pitch < split_pitch {
        Hand::Left
    } else {
        Hand::Right
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timeline {
    notes: Vec<NoteInterval>,
    total_duration_ms: f64,
    longest_note_ms: f64,
}

impl Timeline {
    pub fn empty() -> Self {
        Timeline::default()
    }

    /// Stable-sorts by start time and derives the totals
    pub fn from_notes(mut notes: Vec<NoteInterval>) -> Self {
        notes.sort_by(|a, b| a.start_time_ms.total_cmp(&b.start_time_ms));
        let total_duration_ms = notes.iter().map(|n| n.end_time_ms).fold(0.0, f64::max);
        let longest_note_ms = notes.iter().map(NoteInterval::duration_ms).fold(0.0, f64::max);
        Timeline {
            notes,
            total_duration_ms,
            longest_note_ms,
        }
    }

    pub fn notes(&self) -> &[NoteInterval] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.total_duration_ms
    }

    pub fn longest_note_ms(&self) -> f64 {
        self.longest_note_ms
    }

    /// Index of the first note that could still be sounding at `time_ms`.
    ///
    /// Every note before it starts more than the longest note duration
    /// earlier and so has already ended.
    pub fn first_candidate(&self, time_ms: f64) -> usize {
        let earliest_start = time_ms - self.longest_note_ms;
        self.notes
            .partition_point(|n| n.start_time_ms < earliest_start)
    }

    /// Index one past the last note starting at or before `time_ms`
    pub fn end_of_onsets(&self, time_ms: f64) -> usize {
        self.notes.partition_point(|n| n.start_time_ms <= time_ms)
    }

    /// Notes overlapping `[start_ms, end_ms]`
    pub fn notes_in_range(&self, start_ms: f64, end_ms: f64) -> Vec<&NoteInterval> {
        let from = self.first_candidate(start_ms);
        let to = self.end_of_onsets(end_ms).max(from);
        self.notes[from..to]
            .iter()
            .filter(|n| n.end_time_ms >= start_ms)
            .collect()
    }

    pub fn notes_by_hand(&self, hand: Hand) -> Vec<&NoteInterval> {
        self.notes.iter().filter(|n| n.hand == hand).collect()
    }

    /// Reassign hands by channel lists; unlisted channels use the pitch split
    pub fn assign_hands_by_channel(&mut self, left_channels: &[u8], right_channels: &[u8], split_pitch: u8) {
        for note in &mut self.notes {
            note.hand = if left_channels.contains(&note.channel) {
                Hand::Left
            } else if right_channels.contains(&note.channel) {
                Hand::Right
            } else {
                hand_for_pitch(note.pitch, split_pitch)
            };
        }
    }

    pub fn assign_hands_by_pitch(&mut self, split_pitch: u8) {
        for note in &mut self.notes {
            note.hand = hand_for_pitch(note.pitch, split_pitch);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    ticks_per_beat: u16,
    // SMPTE files count ticks per second; tempo events do not apply to them
    fixed_tempo: Option<u32>,
    rules: HandRules,
    log: Logger,
}

impl TimelineBuilder {
    pub fn new(ticks_per_beat: u16, rules: HandRules, log: Logger) -> Self {
        if ticks_per_beat == 0 {
            log.warn(format_args!("ticks per beat is 0, treating it as 1"));
        }
        TimelineBuilder {
            ticks_per_beat: ticks_per_beat.max(1),
            fixed_tempo: None,
            rules,
            log,
        }
    }

    /// Builder for SMPTE division: `ticks_per_second` is fps × subframes and
    /// `ms = ticks * 1000 / ticks_per_second` whatever tempo events say.
    pub fn timecode(ticks_per_second: u16, rules: HandRules, log: Logger) -> Self {
        TimelineBuilder {
            fixed_tempo: Some(1_000_000),
            ..TimelineBuilder::new(ticks_per_second, rules, log)
        }
    }

    pub fn ticks_per_beat(&self) -> u16 {
        self.ticks_per_beat
    }

    /// Single pass over every track.
    ///
    /// Tick counters restart on each track. The running tempo does not: a
    /// conductor track's tempo stays in effect for the tracks after it.
    pub fn build(&self, tracks: &[Vec<TrackEvent>]) -> Timeline {
        let mut tempo = self.fixed_tempo.unwrap_or(DEFAULT_TEMPO_USEC_PER_BEAT);
        let mut notes = Vec::new();

        for (track_index, events) in tracks.iter().enumerate() {
            let mut abs_ticks: u64 = 0;
            // (pitch, channel) -> (start tick, velocity)
            let mut pending: HashMap<(u8, u8), (u64, u8)> = HashMap::new();

            for event in events {
                abs_ticks += u64::from(event.delta);

                match event.kind {
                    EventKind::Tempo(_) if self.fixed_tempo.is_some() => {}
                    EventKind::Tempo(usec) => {
                        tempo = usec;
                        if usec > 0 {
                            self.log.debug(format_args!(
                                "track {track_index}: tempo {usec} us/beat ({:.2} BPM) at tick {abs_ticks}",
                                60_000_000.0 / f64::from(usec)
                            ));
                        }
                    }
                    EventKind::NoteOn {
                        pitch,
                        velocity,
                        channel,
                    } if velocity > 0 => {
                        if pending.insert((pitch, channel), (abs_ticks, velocity)).is_some() {
                            self.log.debug(format_args!(
                                "track {track_index}: note {pitch} ch {channel} retriggered at tick {abs_ticks}, earlier onset abandoned"
                            ));
                        }
                    }
                    EventKind::NoteOn { pitch, channel, .. } | EventKind::NoteOff { pitch, channel } => {
                        if let Some((start_tick, velocity)) = pending.remove(&(pitch, channel)) {
                            let start_time_ms = ticks_to_ms(start_tick, self.ticks_per_beat, tempo);
                            let end_time_ms = ticks_to_ms(abs_ticks, self.ticks_per_beat, tempo);
                            notes.push(NoteInterval {
                                pitch,
                                velocity,
                                start_time_ms,
                                end_time_ms,
                                channel,
                                hand: self.rules.classify(channel, pitch),
                                track_index,
                            });
                        }
                    }
                    EventKind::Other => {}
                }
            }

            if !pending.is_empty() {
                self.log.debug(format_args!(
                    "track {track_index}: dropped {} unterminated notes",
                    pending.len()
                ));
            }
        }

        let timeline = Timeline::from_notes(notes);
        self.log.info(format_args!(
            "built timeline: {} notes, {:.2} s",
            timeline.len(),
            timeline.total_duration_ms() / 1000.0
        ));
        timeline
    }
}
