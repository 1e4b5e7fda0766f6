//! Wall-clock to timeline mapping with a variable speed multiplier.
//!
//! The clock never reads the time itself: every call takes the frame's
//! `Instant`, so one frame sees a single consistent "now".

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::logging::Logger;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockState {
    Stopped,
    Playing,
    Paused,
}

/// Result of advancing the clock for one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Advance {
    /// Not playing; position unchanged
    Idle,
    Playing(f64),
    /// Reached the end of the piece and stopped itself
    Finished,
}

#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: ClockState,
    position_ms: f64,
    // While playing: position_ms was `anchor_position_ms` at `anchor`
    anchor: Option<Instant>,
    anchor_position_ms: f64,
    speed: f64,
    total_duration_ms: f64,
    log: Logger,
}

impl PlaybackClock {
    pub fn new(total_duration_ms: f64, log: Logger) -> Self {
        PlaybackClock {
            state: ClockState::Stopped,
            position_ms: 0.0,
            anchor: None,
            anchor_position_ms: 0.0,
            speed: 1.0,
            total_duration_ms: total_duration_ms.max(0.0),
            log,
        }
    }

    /// New piece: stopped at zero, speed kept
    pub fn reset(&mut self, total_duration_ms: f64) {
        self.state = ClockState::Stopped;
        self.position_ms = 0.0;
        self.anchor = None;
        self.total_duration_ms = total_duration_ms.max(0.0);
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == ClockState::Playing
    }

    pub fn position_ms(&self) -> f64 {
        self.position_ms
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.total_duration_ms
    }

    fn elapsed_position(&self, now: Instant) -> f64 {
        match self.anchor {
            Some(anchor) => {
                let wall_ms = now.saturating_duration_since(anchor).as_secs_f64() * 1000.0;
                self.anchor_position_ms + wall_ms * self.speed
            }
            None => self.position_ms,
        }
    }

    fn anchor_at(&mut self, now: Instant) {
        self.anchor = Some(now);
        self.anchor_position_ms = self.position_ms;
    }

    /// Stopped → Playing from zero, or Paused → Playing.
    /// Returns false when there is nothing to play or already playing.
    pub fn start(&mut self, now: Instant) -> bool {
        match self.state {
            ClockState::Playing => false,
            ClockState::Paused => self.resume(now),
            ClockState::Stopped => {
                if self.total_duration_ms <= 0.0 {
                    self.log.warn(format_args!("nothing to play: timeline is empty"));
                    return false;
                }
                self.position_ms = 0.0;
                self.anchor_at(now);
                self.state = ClockState::Playing;
                self.log.info(format_args!("playback started"));
                true
            }
        }
    }

    pub fn pause(&mut self, now: Instant) -> bool {
        if self.state != ClockState::Playing {
            return false;
        }
        self.position_ms = self.elapsed_position(now).min(self.total_duration_ms);
        self.anchor = None;
        self.state = ClockState::Paused;
        self.log.info(format_args!("playback paused at {:.0} ms", self.position_ms));
        true
    }

    /// Continue from the frozen position, not from zero
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.state != ClockState::Paused {
            return false;
        }
        self.anchor_at(now);
        self.state = ClockState::Playing;
        self.log.info(format_args!("playback resumed at {:.0} ms", self.position_ms));
        true
    }

    /// Back to zero. Returns whether the clock was running or paused.
    pub fn stop(&mut self) -> bool {
        let was_active = self.state != ClockState::Stopped;
        self.state = ClockState::Stopped;
        self.position_ms = 0.0;
        self.anchor = None;
        if was_active {
            self.log.info(format_args!("playback stopped"));
        }
        was_active
    }

    pub fn advance(&mut self, now: Instant) -> Advance {
        if self.state != ClockState::Playing {
            return Advance::Idle;
        }
        let position = self.elapsed_position(now);
        if position >= self.total_duration_ms {
            self.log.info(format_args!("reached end of piece"));
            self.stop();
            return Advance::Finished;
        }
        self.position_ms = position;
        Advance::Playing(position)
    }

    /// Change speed without a jump in position.
    /// Non-positive or non-finite values are ignored.
    pub fn set_speed(&mut self, now: Instant, speed: f64) -> bool {
        if !(speed.is_finite() && speed > 0.0) {
            self.log.warn(format_args!("ignoring invalid speed {speed}"));
            return false;
        }
        if self.state == ClockState::Playing {
            self.position_ms = self.elapsed_position(now);
            self.anchor_at(now);
        }
        self.speed = speed;
        self.log.debug(format_args!("speed set to {speed:.2}x"));
        true
    }

    /// Jump to `target_ms`, clamped to the piece. Seeking while stopped
    /// leaves the clock paused at the target so the next start continues there.
    pub fn seek(&mut self, now: Instant, target_ms: f64) -> f64 {
        let target = if target_ms.is_finite() {
            target_ms.clamp(0.0, self.total_duration_ms)
        } else {
            0.0
        };
        self.position_ms = target;
        match self.state {
            ClockState::Playing => self.anchor_at(now),
            ClockState::Stopped if self.total_duration_ms > 0.0 => self.state = ClockState::Paused,
            _ => {}
        }
        self.log.debug(format_args!("seek to {target:.0} ms"));
        target
    }
}
