//! Reading standard MIDI files with `midly` and handing the events to the
//! timeline builder

use std::fs;
use std::path::{Path, PathBuf};

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::Serialize;

use crate::error::{KeyfallError, Result};
use crate::logging::Logger;
use crate::timeline::{HandRules, Timeline, TimelineBuilder, TrackEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SongMetadata {
    pub format: String,
    pub track_count: usize,
    /// Ticks per beat, or ticks per second when `timecode` is set
    pub ticks_per_beat: u16,
    pub timecode: bool,
    pub track_name: Option<String>,
    pub copyright: Option<String>,
    pub text: Vec<String>,
}

/// Event streams of every track plus header information
#[derive(Debug, Clone)]
pub struct DecodedMidi {
    pub metadata: SongMetadata,
    pub tracks: Vec<Vec<TrackEvent>>,
}

/// A loaded file: built once, replaced wholesale on the next load
#[derive(Debug, Clone)]
pub struct Song {
    pub path: PathBuf,
    pub name: String,
    pub metadata: SongMetadata,
    pub timeline: Timeline,
}

fn format_name(format: Format) -> &'static str {
    match format {
        Format::SingleTrack => "single-track",
        Format::Parallel => "parallel",
        Format::Sequential => "sequential",
    }
}

fn ticks_per_beat(timing: Timing) -> u16 {
    match timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(fps, subframes) => u16::from(fps.as_int()) * u16::from(subframes),
    }
}

fn text_of(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()
}

/// Decode raw file bytes into builder events
pub fn decode(data: &[u8]) -> std::result::Result<DecodedMidi, midly::Error> {
    let smf = Smf::parse(data)?;

    let mut metadata = SongMetadata {
        format: format_name(smf.header.format).to_string(),
        track_count: smf.tracks.len(),
        ticks_per_beat: ticks_per_beat(smf.header.timing),
        timecode: matches!(smf.header.timing, Timing::Timecode(..)),
        ..SongMetadata::default()
    };

    // Titles and credits conventionally live in the first track
    if let Some(first) = smf.tracks.first() {
        for event in first.iter() {
            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(name)) if metadata.track_name.is_none() => {
                    metadata.track_name = Some(text_of(name));
                }
                TrackEventKind::Meta(MetaMessage::Copyright(text)) if metadata.copyright.is_none() => {
                    metadata.copyright = Some(text_of(text));
                }
                TrackEventKind::Meta(MetaMessage::Text(text)) => {
                    metadata.text.push(text_of(text));
                }
                _ => {}
            }
        }
    }

    let tracks = smf
        .tracks
        .iter()
        .map(|track| {
            track
                .iter()
                .map(|event| {
                    let delta = event.delta.as_int();
                    match event.kind {
                        TrackEventKind::Midi { channel, message } => match message {
                            MidiMessage::NoteOn { key, vel } => {
                                TrackEvent::note_on(delta, key.as_int(), vel.as_int(), channel.as_int())
                            }
                            MidiMessage::NoteOff { key, .. } => {
                                TrackEvent::note_off(delta, key.as_int(), channel.as_int())
                            }
                            _ => TrackEvent::other(delta),
                        },
                        TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => TrackEvent::tempo(delta, tempo.as_int()),
                        _ => TrackEvent::other(delta),
                    }
                })
                .collect()
        })
        .collect();

    Ok(DecodedMidi { metadata, tracks })
}

/// Read, decode and build. Nothing is shared with any previously loaded song,
/// so a failure here leaves the caller's state untouched.
pub fn load_song<P: AsRef<Path>>(path: P, rules: &HandRules, log: &Logger) -> Result<Song> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(KeyfallError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let data = fs::read(path)?;
    let decoded = decode(&data).map_err(|e| KeyfallError::MalformedMidi {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let meta = &decoded.metadata;
    log.info(format_args!(
        "loaded {}: format {}, {} tracks, {} ticks per {}",
        path.display(),
        meta.format,
        meta.track_count,
        meta.ticks_per_beat,
        if meta.timecode { "second" } else { "beat" }
    ));

    let builder = if meta.timecode {
        TimelineBuilder::timecode(meta.ticks_per_beat, rules.clone(), log.child("timeline"))
    } else {
        TimelineBuilder::new(meta.ticks_per_beat, rules.clone(), log.child("timeline"))
    };
    let timeline = builder.build(&decoded.tracks);

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string();

    Ok(Song {
        path: path.to_path_buf(),
        name,
        metadata: decoded.metadata,
        timeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::EventKind;
    use midly::num::{u15, u24, u28, u4, u7};
    use approx::assert_relative_eq;
    use midly::{Fps, Header, TrackEvent as SmfEvent};

    fn smf_bytes(tracks: Vec<Vec<SmfEvent<'static>>>) -> Vec<u8> {
        smf_bytes_with(Timing::Metrical(u15::new(480)), tracks)
    }

    fn smf_bytes_with(timing: Timing, tracks: Vec<Vec<SmfEvent<'static>>>) -> Vec<u8> {
        let format = if tracks.len() > 1 {
            Format::Parallel
        } else {
            Format::SingleTrack
        };
        let smf = Smf {
            header: Header::new(format, timing),
            tracks,
        };
        let mut out = Vec::new();
        smf.write_std(&mut out).unwrap();
        out
    }

    fn ev(delta: u32, kind: TrackEventKind<'static>) -> SmfEvent<'static> {
        SmfEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn midi(channel: u8, message: MidiMessage) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message,
        }
    }

    #[test]
    fn decodes_notes_tempo_and_metadata() {
        let bytes = smf_bytes(vec![vec![
            ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Etude"))),
            ev(0, TrackEventKind::Meta(MetaMessage::Copyright(b"public domain"))),
            ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(600_000)))),
            ev(0, midi(0, MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(100) })),
            ev(480, midi(0, MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(0) })),
            ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.metadata.format, "single-track");
        assert_eq!(decoded.metadata.track_count, 1);
        assert_eq!(decoded.metadata.ticks_per_beat, 480);
        assert!(!decoded.metadata.timecode);
        assert_eq!(decoded.metadata.track_name.as_deref(), Some("Etude"));
        assert_eq!(decoded.metadata.copyright.as_deref(), Some("public domain"));

        let kinds: Vec<EventKind> = decoded.tracks[0].iter().map(|e| e.kind).collect();
        assert_eq!(kinds[2], EventKind::Tempo(600_000));
        assert_eq!(
            kinds[3],
            EventKind::NoteOn {
                pitch: 60,
                velocity: 100,
                channel: 0
            }
        );
        assert_eq!(kinds[4], EventKind::NoteOff { pitch: 60, channel: 0 });
        assert_eq!(decoded.tracks[0][4].delta, 480);
        assert_eq!(kinds[5], EventKind::Other);
    }

    #[test]
    fn smpte_file_ignores_tempo_and_times_in_seconds() {
        let bytes = smf_bytes_with(
            Timing::Timecode(Fps::Fps25, 40),
            vec![vec![
                ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
                ev(0, midi(0, MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(100) })),
                ev(1000, midi(0, MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(0) })),
                ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
            ]],
        );
        let path = std::env::temp_dir().join(format!("e_keyfall_smpte_{}.mid", std::process::id()));
        fs::write(&path, bytes).unwrap();

        let song = load_song(&path, &HandRules::default(), &Logger::silent()).unwrap();
        assert!(song.metadata.timecode);
        assert_eq!(song.metadata.ticks_per_beat, 1000);
        assert_eq!(song.timeline.len(), 1);
        assert_relative_eq!(song.timeline.notes()[0].end_time_ms, 1000.0);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"definitely not a midi file").is_err());
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let err = load_song("/nonexistent/e_keyfall/song.mid", &HandRules::default(), &Logger::silent()).unwrap_err();
        assert!(matches!(err, KeyfallError::FileNotFound { .. }));
    }

    #[test]
    fn malformed_file_is_reported_with_its_path() {
        let path = std::env::temp_dir().join(format!("e_keyfall_malformed_{}.mid", std::process::id()));
        fs::write(&path, b"MThd garbage").unwrap();
        let err = load_song(&path, &HandRules::default(), &Logger::silent()).unwrap_err();
        match err {
            KeyfallError::MalformedMidi { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_song_builds_the_timeline() {
        let bytes = smf_bytes(vec![vec![
            ev(0, midi(0, MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(100) })),
            ev(480, midi(0, MidiMessage::NoteOff { key: u7::new(60), vel: u7::new(0) })),
            ev(0, midi(0, MidiMessage::NoteOn { key: u7::new(64), vel: u7::new(100) })),
            ev(480, midi(0, MidiMessage::NoteOn { key: u7::new(64), vel: u7::new(0) })),
            ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]]);
        let path = std::env::temp_dir().join(format!("e_keyfall_two_notes_{}.mid", std::process::id()));
        fs::write(&path, bytes).unwrap();

        let song = load_song(&path, &HandRules::default(), &Logger::silent()).unwrap();
        assert_eq!(song.name, format!("e_keyfall_two_notes_{}", std::process::id()));
        assert_eq!(song.timeline.len(), 2);
        assert_eq!(song.timeline.total_duration_ms(), 1000.0);
        let _ = fs::remove_file(&path);
    }
}
