//! Key bed layout and falling-note geometry.
//!
//! Everything is drawn as filled rectangles in virtual pixel coordinates
//! (origin top-left, y growing downwards). The terminal front end scales
//! them onto character cells; tests collect them into a `Vec`.

use crate::config::PianoConfig;
use crate::timeline::{Hand, NoteInterval};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const BACKGROUND: Rgb = Rgb(20, 20, 28);
pub const WHITE: Rgb = Rgb(255, 255, 255);
pub const BLACK: Rgb = Rgb(0, 0, 0);
pub const ACTIVE: Rgb = Rgb(50, 255, 50);
pub const WHITE_NOTE: Rgb = Rgb(0, 120, 255);
pub const BLACK_NOTE: Rgb = Rgb(100, 150, 255);
pub const LEFT_HAND: Rgb = Rgb(255, 50, 50);
pub const RIGHT_HAND: Rgb = Rgb(0, 120, 255);
pub const UNKNOWN_HAND: Rgb = Rgb(160, 160, 170);
pub const PROGRESS_TRACK: Rgb = Rgb(60, 60, 70);
pub const PROGRESS_FILL: Rgb = Rgb(50, 200, 90);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilledRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: Rgb,
}

impl FilledRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64, color: Rgb) -> Self {
        FilledRect {
            x,
            y,
            width,
            height,
            color,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Anything that can take filled rectangles
pub trait Surface {
    fn fill_rect(&mut self, rect: FilledRect);
}

impl Surface for Vec<FilledRect> {
    fn fill_rect(&mut self, rect: FilledRect) {
        self.push(rect);
    }
}

const WHITE_STEPS: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
// Index of the white key each black key sits after, with its semitone
const BLACK_STEPS: [(usize, u8); 5] = [(0, 1), (1, 3), (3, 6), (4, 8), (5, 10)];

pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Key {
    pub pitch: u8,
    pub rect: FilledRect,
}

impl Key {
    pub fn is_black(&self) -> bool {
        is_black_key(self.pitch)
    }
}

#[derive(Clone, Debug)]
pub struct KeyboardLayout {
    white: Vec<Key>,
    black: Vec<Key>,
    top_y: f64,
    fall_speed: f64,
    width: f64,
    height: f64,
}

impl KeyboardLayout {
    /// Lay out `octaves` octaves from C of `start_octave` (C4 is pitch 60),
    /// centred horizontally with the key bed `bottom_margin` above the bottom
    pub fn new(config: &PianoConfig, width: f64, height: f64) -> Self {
        let octaves = usize::from(config.octaves);
        let piano_width = config.white_key_width * 7.0 * octaves as f64;
        let left = (width - piano_width) / 2.0;
        let top_y = height - config.white_key_height - config.bottom_margin;
        let base = (u16::from(config.start_octave) + 1) * 12;

        let mut white = Vec::with_capacity(octaves * 7);
        let mut black = Vec::with_capacity(octaves * 5);
        for octave in 0..octaves {
            let octave_base = base + octave as u16 * 12;
            for (i, step) in WHITE_STEPS.iter().enumerate() {
                let Ok(pitch) = u8::try_from(octave_base + u16::from(*step)) else {
                    continue;
                };
                if pitch > 127 {
                    continue;
                }
                let x = left + (octave * 7 + i) as f64 * config.white_key_width;
                white.push(Key {
                    pitch,
                    rect: FilledRect::new(x, top_y, config.white_key_width, config.white_key_height, WHITE),
                });
            }
            for (after, step) in BLACK_STEPS {
                let Ok(pitch) = u8::try_from(octave_base + u16::from(step)) else {
                    continue;
                };
                if pitch > 127 {
                    continue;
                }
                let x = left + (octave * 7 + after + 1) as f64 * config.white_key_width - config.black_key_width / 2.0;
                black.push(Key {
                    pitch,
                    rect: FilledRect::new(x, top_y, config.black_key_width, config.black_key_height, BLACK),
                });
            }
        }

        KeyboardLayout {
            white,
            black,
            top_y,
            fall_speed: config.fall_speed_px_per_ms,
            width,
            height,
        }
    }

    pub fn white_keys(&self) -> &[Key] {
        &self.white
    }

    pub fn black_keys(&self) -> &[Key] {
        &self.black
    }

    /// y coordinate where falling notes meet the keys
    pub fn top_y(&self) -> f64 {
        self.top_y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn pitch_range(&self) -> Option<(u8, u8)> {
        let low = self.white.first()?.pitch;
        let high = self.white.last()?.pitch;
        Some((low, high))
    }

    pub fn key(&self, pitch: u8) -> Option<&Key> {
        let keys = if is_black_key(pitch) { &self.black } else { &self.white };
        keys.iter().find(|k| k.pitch == pitch)
    }

    /// Key under a point; black keys sit on top
    pub fn pitch_at(&self, x: f64, y: f64) -> Option<u8> {
        self.black
            .iter()
            .chain(self.white.iter())
            .find(|k| k.rect.contains(x, y))
            .map(|k| k.pitch)
    }

    /// Rectangle for a note at `now_ms`, or `None` when it is off the key
    /// range or entirely below the key bed. Notes above the window top are
    /// clipped to it.
    pub fn note_rect(&self, note: &NoteInterval, now_ms: f64, color: Rgb) -> Option<FilledRect> {
        let key = self.key(note.pitch)?;
        let bottom = (self.top_y - (note.start_time_ms - now_ms) * self.fall_speed).min(self.top_y);
        let top = (self.top_y - (note.end_time_ms - now_ms) * self.fall_speed).max(0.0);
        if bottom <= top {
            return None;
        }
        Some(FilledRect::new(key.rect.x, top, key.rect.width, bottom - top, color))
    }

    pub fn draw_keys(&self, surface: &mut dyn Surface, active: &[u8]) {
        for key in &self.white {
            // Outline first, then the face one pixel inside it
            surface.fill_rect(FilledRect { color: BLACK, ..key.rect });
            let face = if active.contains(&key.pitch) { ACTIVE } else { WHITE };
            surface.fill_rect(FilledRect::new(
                key.rect.x + 1.0,
                key.rect.y,
                (key.rect.width - 2.0).max(1.0),
                key.rect.height - 1.0,
                face,
            ));
        }
        for key in &self.black {
            let face = if active.contains(&key.pitch) { ACTIVE } else { BLACK };
            surface.fill_rect(FilledRect { color: face, ..key.rect });
        }
    }

    pub fn draw_notes<'a, I>(&self, surface: &mut dyn Surface, notes: I, now_ms: f64, show_hands: bool)
    where
        I: IntoIterator<Item = &'a NoteInterval>,
    {
        for note in notes {
            if let Some(rect) = self.note_rect(note, now_ms, note_color(note, show_hands)) {
                surface.fill_rect(rect);
            }
        }
    }

    /// Background, falling notes, then the key bed on top
    pub fn draw<'a, I>(&self, surface: &mut dyn Surface, notes: I, now_ms: f64, active: &[u8], show_hands: bool)
    where
        I: IntoIterator<Item = &'a NoteInterval>,
    {
        surface.fill_rect(FilledRect::new(0.0, 0.0, self.width, self.height, BACKGROUND));
        self.draw_notes(surface, notes, now_ms, show_hands);
        self.draw_keys(surface, active);
    }
}

pub fn note_color(note: &NoteInterval, show_hands: bool) -> Rgb {
    if show_hands {
        match note.hand {
            Hand::Left => LEFT_HAND,
            Hand::Right => RIGHT_HAND,
            Hand::Unknown => UNKNOWN_HAND,
        }
    } else if is_black_key(note.pitch) {
        BLACK_NOTE
    } else {
        WHITE_NOTE
    }
}

/// Track plus filled portion; `fraction` is clamped to 0..=1
pub fn draw_progress_bar(surface: &mut dyn Surface, area: FilledRect, fraction: f64) {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    surface.fill_rect(FilledRect {
        color: PROGRESS_TRACK,
        ..area
    });
    if fraction > 0.0 {
        surface.fill_rect(FilledRect {
            width: area.width * fraction,
            color: PROGRESS_FILL,
            ..area
        });
    }
}

/// Position within `area` as a fraction of its width, for seeking by click
pub fn progress_fraction_at(area: &FilledRect, x: f64) -> f64 {
    if area.width <= 0.0 {
        return 0.0;
    }
    ((x - area.x) / area.width).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn layout() -> KeyboardLayout {
        KeyboardLayout::new(&PianoConfig::default(), 1600.0, 800.0)
    }

    fn note(pitch: u8, start: f64, end: f64, hand: Hand) -> NoteInterval {
        NoteInterval {
            pitch,
            velocity: 100,
            start_time_ms: start,
            end_time_ms: end,
            channel: 0,
            hand,
            track_index: 0,
        }
    }

    #[test]
    fn five_octaves_from_c2() {
        let layout = layout();
        assert_eq!(layout.white_keys().len(), 35);
        assert_eq!(layout.black_keys().len(), 25);
        assert_eq!(layout.pitch_range(), Some((36, 95)));
        assert!(layout.black_keys().iter().all(Key::is_black));
    }

    #[test]
    fn keyboard_is_centred_above_the_margin() {
        let layout = layout();
        let first = layout.white_keys()[0].rect;
        assert_relative_eq!(first.x, 100.0);
        assert_relative_eq!(layout.top_y(), 550.0);
        // C#2 straddles the C2/D2 boundary
        let c_sharp = layout.key(37).unwrap().rect;
        assert_relative_eq!(c_sharp.x, 100.0 + 40.0 - 12.0);
    }

    #[test]
    fn black_keys_win_hit_tests() {
        let layout = layout();
        let c_sharp = layout.key(37).unwrap().rect;
        assert_eq!(layout.pitch_at(c_sharp.x + 1.0, c_sharp.y + 1.0), Some(37));
        // Below the black key only the white key remains
        assert_eq!(layout.pitch_at(c_sharp.x + 1.0, c_sharp.y + 120.0), Some(36));
        assert_eq!(layout.pitch_at(0.0, 0.0), None);
    }

    #[test]
    fn upcoming_note_hangs_above_the_key_bed() {
        let layout = layout();
        let rect = layout
            .note_rect(&note(60, 1000.0, 1500.0, Hand::Right), 0.0, WHITE_NOTE)
            .unwrap();
        assert_relative_eq!(rect.y + rect.height, 450.0);
        assert_relative_eq!(rect.height, 50.0);
        assert_relative_eq!(rect.x, layout.key(60).unwrap().rect.x);
    }

    #[test]
    fn sounding_note_is_clipped_at_the_key_bed() {
        let layout = layout();
        let rect = layout
            .note_rect(&note(60, 0.0, 1000.0, Hand::Right), 500.0, WHITE_NOTE)
            .unwrap();
        assert_relative_eq!(rect.y + rect.height, layout.top_y());
        assert_relative_eq!(rect.height, 50.0);
    }

    #[test]
    fn finished_or_out_of_range_notes_are_not_drawn() {
        let layout = layout();
        assert!(layout.note_rect(&note(60, 0.0, 100.0, Hand::Right), 500.0, WHITE).is_none());
        assert!(layout.note_rect(&note(20, 0.0, 1000.0, Hand::Right), 0.0, WHITE).is_none());
    }

    #[test]
    fn hand_colours_only_when_enabled() {
        let left = note(40, 0.0, 1.0, Hand::Left);
        assert_eq!(note_color(&left, true), LEFT_HAND);
        assert_eq!(note_color(&left, false), WHITE_NOTE);
        assert_eq!(note_color(&note(61, 0.0, 1.0, Hand::Left), false), BLACK_NOTE);
    }

    #[test]
    fn active_keys_are_highlighted() {
        let layout = layout();
        let mut surface: Vec<FilledRect> = Vec::new();
        layout.draw_keys(&mut surface, &[60, 61]);
        let active = surface.iter().filter(|r| r.color == ACTIVE).count();
        assert_eq!(active, 2);
    }

    #[test]
    fn frame_starts_with_the_background() {
        let layout = layout();
        let notes = [note(60, 100.0, 200.0, Hand::Right)];
        let mut surface: Vec<FilledRect> = Vec::new();
        layout.draw(&mut surface, notes.iter(), 0.0, &[], true);
        assert_eq!(surface[0].color, BACKGROUND);
        assert_eq!(surface[1].color, RIGHT_HAND);
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        let area = FilledRect::new(10.0, 0.0, 200.0, 8.0, PROGRESS_TRACK);
        let mut surface: Vec<FilledRect> = Vec::new();
        draw_progress_bar(&mut surface, area, 0.25);
        assert_eq!(surface.len(), 2);
        assert_relative_eq!(surface[1].width, 50.0);
        assert_relative_eq!(progress_fraction_at(&area, 60.0), 0.25);
        assert_relative_eq!(progress_fraction_at(&area, -5.0), 0.0);
    }
}
