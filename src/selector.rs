//! Per-frame queries against the sorted note list: which notes to draw and
//! which notes change their audible state.

use std::collections::BTreeSet;

use crate::config::PlaybackConfig;
use crate::timeline::{NoteInterval, Timeline};

/// Time span around the playhead whose notes are drawn
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderWindow {
    pub look_ahead_ms: f64,
    pub trailing_ms: f64,
}

impl Default for RenderWindow {
    fn default() -> Self {
        RenderWindow {
            look_ahead_ms: 3000.0,
            trailing_ms: 1000.0,
        }
    }
}

impl RenderWindow {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        RenderWindow {
            look_ahead_ms: config.look_ahead_ms,
            trailing_ms: config.trailing_ms,
        }
    }

    /// `start <= now + look_ahead && end >= now - trailing`
    pub fn contains(&self, note: &NoteInterval, now_ms: f64) -> bool {
        note.start_time_ms <= now_ms + self.look_ahead_ms && note.end_time_ms >= now_ms - self.trailing_ms
    }

    /// Indices of the notes to draw, in timeline order.
    ///
    /// Only the slice between the first possibly-visible note and the last
    /// onset inside the look-ahead is scanned.
    pub fn render_indices(&self, timeline: &Timeline, now_ms: f64) -> Vec<usize> {
        let notes = timeline.notes();
        let from = timeline.first_candidate(now_ms - self.trailing_ms);
        let to = timeline.end_of_onsets(now_ms + self.look_ahead_ms).max(from);
        (from..to).filter(|&i| self.contains(&notes[i], now_ms)).collect()
    }

    pub fn render_set<'a>(&self, timeline: &'a Timeline, now_ms: f64) -> Vec<&'a NoteInterval> {
        let notes = timeline.notes();
        self.render_indices(timeline, now_ms)
            .into_iter()
            .map(|i| &notes[i])
            .collect()
    }
}

/// One audio transition; `index` is the note's position in the timeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Play { index: usize, pitch: u8, velocity: u8 },
    Stop { index: usize, pitch: u8 },
}

impl Trigger {
    pub fn index(&self) -> usize {
        match *self {
            Trigger::Play { index, .. } | Trigger::Stop { index, .. } => index,
        }
    }
}

/// Tracks which notes have an outstanding play without a matching stop.
///
/// A note is played once when the playhead lands inside
/// `[start, start + tolerance]` and stopped once the playhead reaches its end.
/// Notes that have already sounded stay retired until they leave the onset
/// window, so a short note is never retriggered by a late frame.
#[derive(Debug, Clone)]
pub struct TriggerResolver {
    tolerance_ms: f64,
    sounding: BTreeSet<usize>,
    retired: BTreeSet<usize>,
}

impl TriggerResolver {
    pub fn new(tolerance_ms: f64) -> Self {
        TriggerResolver {
            tolerance_ms: tolerance_ms.max(0.0),
            sounding: BTreeSet::new(),
            retired: BTreeSet::new(),
        }
    }

    pub fn tolerance_ms(&self) -> f64 {
        self.tolerance_ms
    }

    pub fn is_sounding(&self, index: usize) -> bool {
        self.sounding.contains(&index)
    }

    pub fn sounding(&self) -> impl Iterator<Item = usize> + '_ {
        self.sounding.iter().copied()
    }

    pub fn sounding_pitches(&self, timeline: &Timeline) -> Vec<u8> {
        let notes = timeline.notes();
        let mut pitches: Vec<u8> = self
            .sounding
            .iter()
            .filter_map(|&i| notes.get(i).map(|n| n.pitch))
            .collect();
        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }

    /// Forget every flag; the caller silences the backend itself
    pub fn reset(&mut self) {
        self.sounding.clear();
        self.retired.clear();
    }

    fn onset_window(&self, timeline: &Timeline, now_ms: f64) -> std::ops::Range<usize> {
        let earliest = now_ms - self.tolerance_ms;
        let from = timeline.notes().partition_point(|n| n.start_time_ms < earliest);
        let to = timeline.end_of_onsets(now_ms).max(from);
        from..to
    }

    /// Transitions for a frame at `now_ms`. Stops come first so a pitch that
    /// ends and restarts on the same frame is released before it is struck.
    pub fn resolve(&mut self, timeline: &Timeline, now_ms: f64) -> Vec<Trigger> {
        let notes = timeline.notes();
        let mut triggers = Vec::new();

        let ended: Vec<usize> = self
            .sounding
            .iter()
            .copied()
            .filter(|&i| notes.get(i).map_or(true, |n| n.end_time_ms <= now_ms))
            .collect();
        for index in ended {
            self.sounding.remove(&index);
            self.retired.insert(index);
            if let Some(note) = notes.get(index) {
                triggers.push(Trigger::Stop {
                    index,
                    pitch: note.pitch,
                });
            }
        }

        let tolerance = self.tolerance_ms;
        self.retired
            .retain(|&i| notes.get(i).map_or(false, |n| n.start_time_ms + tolerance >= now_ms));

        for index in self.onset_window(timeline, now_ms) {
            if self.sounding.contains(&index) || self.retired.contains(&index) {
                continue;
            }
            let note = &notes[index];
            self.sounding.insert(index);
            triggers.push(Trigger::Play {
                index,
                pitch: note.pitch,
                velocity: note.velocity,
            });
        }

        triggers
    }

    /// Bring the flags in line with a jump to `target_ms`: stop what no
    /// longer covers the target, start what does.
    pub fn resync(&mut self, timeline: &Timeline, target_ms: f64) -> Vec<Trigger> {
        let notes = timeline.notes();
        let mut triggers = Vec::new();

        let stale: Vec<usize> = self
            .sounding
            .iter()
            .copied()
            .filter(|&i| notes.get(i).map_or(true, |n| !n.contains(target_ms)))
            .collect();
        for index in stale {
            self.sounding.remove(&index);
            if let Some(note) = notes.get(index) {
                triggers.push(Trigger::Stop {
                    index,
                    pitch: note.pitch,
                });
            }
        }

        self.retired.clear();
        let from = timeline.first_candidate(target_ms);
        let to = timeline.end_of_onsets(target_ms).max(from);
        for index in from..to {
            let note = &notes[index];
            if note.contains(target_ms) {
                if self.sounding.insert(index) {
                    triggers.push(Trigger::Play {
                        index,
                        pitch: note.pitch,
                        velocity: note.velocity,
                    });
                }
            } else if note.start_time_ms + self.tolerance_ms >= target_ms {
                // Already over but still inside the onset window
                self.retired.insert(index);
            }
        }

        triggers
    }
}
