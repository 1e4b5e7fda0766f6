//! Logging collaborator handed to every component.
//!
//! Components never consult a global verbosity switch. Each one owns a
//! [`Logger`] carrying its target name and level, and the process-wide
//! `env_logger` sink is installed exactly once by [`init`].

use std::fmt;
use std::fs::File;
use std::path::Path;

use log::{Level, LevelFilter};

#[derive(Debug, Clone)]
pub struct Logger {
    target: String,
    level: LevelFilter,
}

impl Logger {
    pub fn new(target: impl Into<String>, level: LevelFilter) -> Self {
        Self {
            target: target.into(),
            level,
        }
    }

    /// Logger that drops everything, for tests and headless tools
    pub fn silent() -> Self {
        Self::new("e_keyfall", LevelFilter::Off)
    }

    /// Derive a logger for a sub-component, keeping this logger's level
    pub fn child(&self, name: &str) -> Self {
        Self {
            target: format!("{}::{}", self.target, name),
            level: self.level,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if self.enabled(level) {
            log::log!(target: self.target.as_str(), level, "{}", args);
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Install the `env_logger` sink. `RUST_LOG` still overrides the level.
///
/// While the terminal UI owns stdout/stderr the log has to go somewhere else,
/// so a `log_file` redirects the output into that file.
pub fn init(verbose: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_for(verbose)).parse_default_env();

    if let Some(path) = log_file {
        let file = File::create(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    // A second init (tests, embedding) keeps the first sink.
    let _ = builder.try_init();
    Ok(())
}
