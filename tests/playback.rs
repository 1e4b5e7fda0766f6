use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use e_keyfall::audio::{AudioCall, RecordingBackend};
use e_keyfall::{Config, Hand, KeyfallError, Logger, Session, TransportCommand};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

fn ev(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind,
    }
}

fn on(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
    ev(
        delta,
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(96),
            },
        },
    )
}

fn off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
    ev(
        delta,
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        },
    )
}

fn end() -> TrackEvent<'static> {
    ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack))
}

fn write_midi(name: &str, tracks: Vec<Vec<TrackEvent<'static>>>) -> PathBuf {
    let smf = Smf {
        header: Header::new(Format::Parallel, Timing::Metrical(u15::new(480))),
        tracks,
    };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    let path = std::env::temp_dir().join(format!("e_keyfall_it_{}_{}.mid", name, std::process::id()));
    fs::write(&path, bytes).unwrap();
    path
}

/// Conductor track at 120 bpm, melody on channel 0 and bass on channel 1
fn two_hand_piece(name: &str) -> PathBuf {
    write_midi(
        name,
        vec![
            vec![ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))), end()],
            vec![
                on(0, 0, 72),
                off(480, 0, 72),
                on(0, 0, 74),
                off(480, 0, 74),
                end(),
            ],
            vec![on(0, 1, 48), off(960, 1, 48), end()],
        ],
    )
}

fn session() -> (Session, RecordingBackend) {
    let recorder = RecordingBackend::new();
    let session = Session::new(&Config::default(), Box::new(recorder.clone()), Logger::silent());
    recorder.clear();
    (session, recorder)
}

fn at(base: Instant, ms: u64) -> Instant {
    base + Duration::from_millis(ms)
}

#[test]
fn loads_a_multi_track_file() {
    let path = two_hand_piece("load");
    let (mut session, recorder) = session();
    session.load(path.clone()).unwrap();

    let timeline = session.timeline();
    assert_eq!(timeline.len(), 3);
    assert_relative_eq!(timeline.total_duration_ms(), 1000.0);
    assert_eq!(timeline.notes_by_hand(Hand::Left).len(), 1);
    assert_eq!(timeline.notes_by_hand(Hand::Right).len(), 2);
    // Loading silences whatever was playing before
    assert_eq!(recorder.calls(), vec![AudioCall::StopAll]);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.note_count, 3);
    assert!(!snapshot.is_playing);
    let _ = fs::remove_file(path);
}

#[test]
fn plays_through_to_the_end() {
    let path = two_hand_piece("play");
    let (mut session, recorder) = session();
    session.load(path.clone()).unwrap();
    recorder.clear();

    let t0 = Instant::now();
    session.apply(TransportCommand::Play, t0).unwrap();
    let mut finished = false;
    for ms in (0..=1100).step_by(16) {
        let view = session.tick(at(t0, ms));
        finished |= view.finished;
    }
    assert!(finished);

    let calls = recorder.calls();
    let plays = calls.iter().filter(|c| matches!(c, AudioCall::Play { .. })).count();
    assert_eq!(plays, 3);
    assert!(calls.contains(&AudioCall::Stop { pitch: 72 }));
    assert_eq!(calls.last(), Some(&AudioCall::StopAll));
    assert!(!session.snapshot().is_playing);
    let _ = fs::remove_file(path);
}

#[test]
fn double_speed_halves_the_wall_time() {
    let path = two_hand_piece("speed");
    let (mut session, _) = session();
    session.load(path.clone()).unwrap();

    let t0 = Instant::now();
    session.apply(TransportCommand::SetSpeed(2.0), t0).unwrap();
    session.apply(TransportCommand::Play, t0).unwrap();
    let view = session.tick(at(t0, 250));
    assert_relative_eq!(view.position_ms, 500.0, epsilon = 1e-6);
    let _ = fs::remove_file(path);
}

#[test]
fn render_set_follows_the_playhead() {
    let path = two_hand_piece("render");
    let (mut session, _) = session();
    session.load(path.clone()).unwrap();

    let t0 = Instant::now();
    session.apply(TransportCommand::Play, t0).unwrap();
    let view = session.tick(at(t0, 10));
    assert_eq!(view.visible.len(), 3);
    let _ = fs::remove_file(path);
}

#[test]
fn pause_silences_and_resume_restores_held_notes() {
    let path = two_hand_piece("pause");
    let (mut session, recorder) = session();
    session.load(path.clone()).unwrap();

    let t0 = Instant::now();
    session.apply(TransportCommand::Play, t0).unwrap();
    session.tick(at(t0, 100));
    session.apply(TransportCommand::Pause, at(t0, 200)).unwrap();
    assert_eq!(recorder.calls().last(), Some(&AudioCall::StopAll));

    recorder.clear();
    session.apply(TransportCommand::Play, at(t0, 5_000)).unwrap();
    let calls = recorder.calls();
    // Bass and the first melody note both cover 200 ms
    assert!(calls.contains(&AudioCall::Play { pitch: 48, velocity: 96 }));
    assert!(calls.contains(&AudioCall::Play { pitch: 72, velocity: 96 }));
    assert_relative_eq!(session.snapshot().current_time_ms, 200.0, epsilon = 1e-6);
    let _ = fs::remove_file(path);
}

#[test]
fn missing_file_leaves_the_session_untouched() {
    let path = two_hand_piece("keep");
    let (mut session, _) = session();
    session.load(path.clone()).unwrap();

    let err = session
        .apply(TransportCommand::Load(PathBuf::from("/nonexistent/e_keyfall.mid")), Instant::now())
        .unwrap_err();
    assert!(matches!(err, KeyfallError::FileNotFound { .. }));
    assert_eq!(session.timeline().len(), 3);
    let _ = fs::remove_file(path);
}

#[test]
fn malformed_file_leaves_the_session_untouched() {
    let good = two_hand_piece("good");
    let bad = std::env::temp_dir().join(format!("e_keyfall_it_bad_{}.mid", std::process::id()));
    fs::write(&bad, b"not a midi file at all").unwrap();

    let (mut session, _) = session();
    session.load(good.clone()).unwrap();
    let err = session.load(bad.clone()).unwrap_err();
    assert!(matches!(err, KeyfallError::MalformedMidi { .. }));
    assert_eq!(session.snapshot().note_count, 3);

    let _ = fs::remove_file(good);
    let _ = fs::remove_file(bad);
}

#[test]
fn empty_file_is_not_an_error() {
    let path = write_midi("empty", vec![vec![end()]]);
    let (mut session, _) = session();
    session.load(path.clone()).unwrap();

    assert!(session.timeline().is_empty());
    assert_eq!(session.snapshot().total_duration_ms, 0.0);
    // Nothing to play
    session.apply(TransportCommand::Play, Instant::now()).unwrap();
    assert!(!session.snapshot().is_playing);
    assert!(session.tick(Instant::now()).visible.is_empty());
    let _ = fs::remove_file(path);
}

#[test]
fn seek_while_stopped_then_play_continues_from_target() {
    let path = two_hand_piece("seek");
    let (mut session, recorder) = session();
    session.load(path.clone()).unwrap();
    recorder.clear();

    let t0 = Instant::now();
    session.apply(TransportCommand::Seek(600.0), t0).unwrap();
    assert!(recorder.calls().is_empty());
    session.apply(TransportCommand::Play, t0).unwrap();
    assert_eq!(
        recorder.calls(),
        vec![
            AudioCall::Play { pitch: 48, velocity: 96 },
            AudioCall::Play { pitch: 74, velocity: 96 },
        ]
    );
    let view = session.tick(at(t0, 100));
    assert_relative_eq!(view.position_ms, 700.0, epsilon = 1e-6);
    let _ = fs::remove_file(path);
}
