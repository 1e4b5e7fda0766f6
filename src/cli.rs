use std::path::PathBuf;
use std::process::ExitCode;

use ansi_term::Colour::{Cyan, Green, Red, Yellow};
use ansi_term::Style;
use clap::Parser;
use serde::Serialize;

use crate::audio::open_backend;
use crate::config::Config;
use crate::error::{KeyfallError, Result};
use crate::logging::{self, Logger};
use crate::midi_file::{load_song, Song, SongMetadata};
use crate::session::Session;
use crate::timeline::{HandRules, NoteInterval};
use crate::{format_duration, set_shutdown_flag, tui};

/// Number of notes listed by `--info`
const INFO_NOTE_COUNT: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "e_keyfall")]
#[command(about = "Falling-notes MIDI visualizer and player for the terminal")]
#[command(version)]
pub struct Cli {
    /// MIDI file to open
    pub file: Option<PathBuf>,

    /// Virtual canvas width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Virtual canvas height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Start without a file and play from the computer keyboard
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// Debug-level logging
    #[arg(short = 'v', long, visible_alias = "debug")]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// MIDI output port index
    #[arg(long)]
    pub midi_port: Option<usize>,

    /// Where log output goes while the terminal UI is running
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print file information and exit
    #[arg(long)]
    pub info: bool,

    /// With --info, print JSON instead of text
    #[arg(long, requires = "info")]
    pub json: bool,
}

impl Cli {
    /// Load the configuration file if any, then apply command line overrides
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(width) = self.width {
            config.window.width = width;
        }
        if let Some(height) = self.height {
            config.window.height = height;
        }
        if self.midi_port.is_some() {
            config.audio.midi_port = self.midi_port;
        }
        config.validate().map_err(|reason| KeyfallError::Config {
            path: self.config.clone(),
            reason,
        })?;
        Ok(config)
    }

    fn tui_log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("e_keyfall.log"))
    }
}

#[derive(Debug, Serialize)]
pub struct SongSummary<'a> {
    pub name: &'a str,
    pub path: &'a std::path::Path,
    pub metadata: &'a SongMetadata,
    pub note_count: usize,
    pub duration_ms: f64,
    pub notes: &'a [NoteInterval],
}

impl<'a> SongSummary<'a> {
    pub fn new(song: &'a Song) -> Self {
        let notes = song.timeline.notes();
        SongSummary {
            name: &song.name,
            path: &song.path,
            metadata: &song.metadata,
            note_count: notes.len(),
            duration_ms: song.timeline.total_duration_ms(),
            notes: &notes[..notes.len().min(INFO_NOTE_COUNT)],
        }
    }
}

fn print_song_info(song: &Song, json: bool) -> Result<()> {
    let summary = SongSummary::new(song);
    if json {
        let text = serde_json::to_string_pretty(&summary).map_err(std::io::Error::from)?;
        println!("{text}");
        return Ok(());
    }

    println!("{}", Cyan.bold().paint(format!("🎼 {}", summary.name)));
    println!("   File:      {}", summary.path.display());
    println!(
        "   Format:    {} ({} tracks, {} ticks per {})",
        summary.metadata.format,
        summary.metadata.track_count,
        summary.metadata.ticks_per_beat,
        if summary.metadata.timecode { "second" } else { "beat" }
    );
    if let Some(name) = &summary.metadata.track_name {
        println!("   Title:     {name}");
    }
    if let Some(copyright) = &summary.metadata.copyright {
        println!("   Copyright: {copyright}");
    }
    for text in &summary.metadata.text {
        println!("   Text:      {text}");
    }
    println!(
        "   Notes:     {}   Duration: {}",
        Green.paint(summary.note_count.to_string()),
        Green.paint(format_duration(summary.duration_ms))
    );

    if summary.notes.is_empty() {
        println!("{}", Yellow.paint("   (no notes)"));
        return Ok(());
    }
    println!("{}", Style::new().bold().paint("   pitch  vel  start(ms)    end(ms)  ch  hand"));
    for note in summary.notes {
        println!(
            "   {:>5}  {:>3}  {:>9.1}  {:>9.1}  {:>2}  {}",
            note.pitch,
            note.velocity,
            note.start_time_ms,
            note.end_time_ms,
            note.channel,
            note.hand.label()
        );
    }
    Ok(())
}

fn run_info(cli: &Cli, config: &Config, log: &Logger) -> ExitCode {
    let Some(path) = &cli.file else {
        eprintln!("{}", Red.paint("❌ --info needs a MIDI file"));
        return ExitCode::FAILURE;
    };
    let rules = HandRules::from_config(&config.hands);
    match load_song(path, &rules, log) {
        Ok(song) => match print_song_info(&song, cli.json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{}", Red.paint(format!("❌ {e}")));
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("{}", Red.paint(format!("❌ {e}")));
            ExitCode::FAILURE
        }
    }
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.resolve_config()?;

    // The terminal UI owns the screen, so its log goes to a file
    let log_file = if cli.info { cli.log_file.clone() } else { Some(cli.tui_log_file()) };
    logging::init(cli.verbose, log_file.as_deref())?;
    let log = Logger::new("e_keyfall", logging::level_for(cli.verbose));

    if let Some(path) = &cli.file {
        if !path.exists() {
            let err = KeyfallError::FileNotFound { path: path.clone() };
            log.error(format_args!("{err}"));
            eprintln!("{}", Red.paint(format!("❌ {err}")));
            return Ok(ExitCode::FAILURE);
        }
    }

    if cli.info {
        return Ok(run_info(&cli, &config, &log));
    }

    if let Err(e) = ctrlc::set_handler(set_shutdown_flag) {
        log.warn(format_args!("could not install Ctrl+C handler: {e}"));
    }

    let backend = open_backend(config.audio.midi_port, config.audio.channel, &log.child("audio"));
    let mut session = Session::new(&config, backend, log.child("session"));
    let mut startup_messages = Vec::new();
    if let Some(path) = &cli.file {
        if let Err(e) = session.load(path.clone()) {
            log.error(format_args!("{e}"));
            startup_messages.push(format!("❌ {e}"));
        }
    } else if cli.interactive {
        log.info(format_args!("interactive mode: no file loaded"));
    }

    tui::run_tui(&mut session, &config, startup_messages, &log.child("tui"))?;
    session.shutdown();
    Ok(ExitCode::SUCCESS)
}

pub fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", Red.paint(format!("❌ {e}")));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Hand, Timeline};

    #[test]
    fn parses_file_and_window_size() {
        let cli = Cli::try_parse_from(["e_keyfall", "song.mid", "--width", "1024", "--height", "600"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("song.mid")));
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
    }

    #[test]
    fn debug_is_an_alias_for_verbose() {
        let cli = Cli::try_parse_from(["e_keyfall", "--debug"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.file.is_none());
    }

    #[test]
    fn json_requires_info() {
        assert!(Cli::try_parse_from(["e_keyfall", "a.mid", "--json"]).is_err());
        assert!(Cli::try_parse_from(["e_keyfall", "a.mid", "--info", "--json"]).is_ok());
    }

    #[test]
    fn zero_width_is_rejected() {
        let cli = Cli::try_parse_from(["e_keyfall", "--width", "0"]).unwrap();
        assert!(matches!(cli.resolve_config(), Err(KeyfallError::Config { .. })));
    }

    #[test]
    fn midi_port_overrides_config() {
        let cli = Cli::try_parse_from(["e_keyfall", "--midi-port", "2"]).unwrap();
        assert_eq!(cli.resolve_config().unwrap().audio.midi_port, Some(2));
    }

    #[test]
    fn summary_lists_at_most_ten_notes() {
        let notes = (0..25)
            .map(|i| NoteInterval {
                pitch: 60,
                velocity: 90,
                start_time_ms: f64::from(i) * 100.0,
                end_time_ms: f64::from(i) * 100.0 + 50.0,
                channel: 0,
                hand: Hand::Right,
                track_index: 0,
            })
            .collect();
        let song = Song {
            path: PathBuf::from("scale.mid"),
            name: "scale".to_string(),
            metadata: SongMetadata::default(),
            timeline: Timeline::from_notes(notes),
        };
        let summary = SongSummary::new(&song);
        assert_eq!(summary.note_count, 25);
        assert_eq!(summary.notes.len(), INFO_NOTE_COUNT);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["note_count"], 25);
        assert_eq!(json["notes"][0]["hand"], "right");
    }
}
