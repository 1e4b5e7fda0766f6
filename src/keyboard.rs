//! Computer keyboard as a piano. The lower row covers C3..E4 and the upper
//! row C4..C5, so C4..E4 can be played from either row.

use std::time::Duration;

/// How long a key sounds without a repeat when the terminal never reports
/// releases. Longer than the usual auto-repeat delay (600-660 ms) so a held
/// key is not cut and struck again before repeats start arriving.
pub const HOLD_TIMEOUT: Duration = Duration::from_millis(750);

/// `(key, pitch)` pairs; several keys share a pitch on purpose
pub const KEY_MAP: &[(char, u8)] = &[
    // lower row with the home row for sharps
    ('z', 48),
    ('s', 49),
    ('x', 50),
    ('d', 51),
    ('c', 52),
    ('v', 53),
    ('g', 54),
    ('b', 55),
    ('h', 56),
    ('n', 57),
    ('j', 58),
    ('m', 59),
    (',', 60),
    ('l', 61),
    ('.', 62),
    (';', 63),
    ('/', 64),
    // upper row with the number row for sharps
    ('q', 60),
    ('2', 61),
    ('w', 62),
    ('3', 63),
    ('e', 64),
    ('r', 65),
    ('5', 66),
    ('t', 67),
    ('6', 68),
    ('y', 69),
    ('7', 70),
    ('u', 71),
    ('i', 72),
];

pub fn pitch_for_key(key: char) -> Option<u8> {
    let key = key.to_ascii_lowercase();
    KEY_MAP.iter().find(|(k, _)| *k == key).map(|&(_, pitch)| pitch)
}
