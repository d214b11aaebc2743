//! Phase state machine and time formatting.
//!
//! The machine is driven by wall-clock deltas. It owns no thread: the caller
//! feeds it either explicit deltas through [`PhaseMachine::advance`] or
//! timestamps through [`PhaseMachine::tick`].
//!
//! Completion is split in two steps. `advance` stops the timer at zero and
//! reports an [`Expiry`] once; the engine books the session and then calls
//! [`PhaseMachine::complete`] to move on to the next phase.

use crate::models::{CountDirection, Phase, Settings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Observable timer state.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerState {
    pub phase: Phase,
    pub remaining_secs: f64,
    pub elapsed_secs: f64,
    pub running: bool,
    /// Focus sessions completed since the last full reset.
    pub pomodoros_completed_in_cycle: u32,
    /// 1-based cycle number, never above `total_cycles`.
    pub current_cycle: u32,
}

/// The part of the timer that survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerCheckpoint {
    pub phase: Phase,
    pub remaining_secs: f64,
}

/// A phase ran out of time and waits to be booked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Expiry {
    pub phase: Phase,
    /// Time spent in the phase, capped at its configured length.
    pub elapsed_secs: f64,
    /// When the phase was first started, if it ever was.
    pub started_at: Option<DateTime<Utc>>,
}

/// Result of completing a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    /// True when a long break finished, closing a cycle.
    pub cycle_completed: bool,
}

#[derive(Debug, Clone)]
pub struct PhaseMachine {
    state: TimerState,
    total_secs: f64,
    last_observed: Option<DateTime<Utc>>,
    phase_started_at: Option<DateTime<Utc>>,
    pending: Option<Expiry>,
}

impl PhaseMachine {
    /// A stopped focus phase at full length.
    pub fn new(settings: &Settings) -> Self {
        let total_secs = settings.phase_secs(Phase::Focus);
        Self {
            state: TimerState {
                phase: Phase::Focus,
                remaining_secs: total_secs,
                elapsed_secs: 0.0,
                running: false,
                pomodoros_completed_in_cycle: 0,
                current_cycle: 1,
            },
            total_secs,
            last_observed: None,
            phase_started_at: None,
            pending: None,
        }
    }

    /// Rebuilds a stopped machine from a checkpoint. Counters start fresh.
    pub fn restore(checkpoint: TimerCheckpoint, settings: &Settings) -> Self {
        let mut machine = Self::new(settings);
        machine.enter(checkpoint.phase, settings);
        let remaining = checkpoint.remaining_secs.clamp(0.0, machine.total_secs);
        machine.state.remaining_secs = remaining;
        machine.state.elapsed_secs = machine.total_secs - remaining;
        machine
    }

    pub fn checkpoint(&self) -> TimerCheckpoint {
        TimerCheckpoint {
            phase: self.state.phase,
            remaining_secs: self.state.remaining_secs,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Full length of the current phase in seconds.
    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }

    pub fn phase_started_at(&self) -> Option<DateTime<Utc>> {
        self.phase_started_at
    }

    /// An expiry has been reported but not completed yet.
    pub fn has_pending_expiry(&self) -> bool {
        self.pending.is_some()
    }

    /// Fraction of the current phase already spent, in 0..=1.
    pub fn progress(&self) -> f64 {
        if self.total_secs <= 0.0 {
            return 0.0;
        }
        ((self.total_secs - self.state.remaining_secs) / self.total_secs).clamp(0.0, 1.0)
    }

    /// Whole seconds shown to the user, never negative.
    pub fn display_secs(&self, direction: CountDirection) -> u64 {
        let secs = match direction {
            CountDirection::Down => self.state.remaining_secs,
            CountDirection::Up => self.state.elapsed_secs,
        };
        secs.max(0.0).round() as u64
    }

    /// Starts the countdown. Returns false if it was already running.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.running || self.pending.is_some() {
            return false;
        }
        self.state.running = true;
        self.last_observed = Some(now);
        self.phase_started_at.get_or_insert(now);
        debug!(phase = %self.state.phase, remaining = self.state.remaining_secs, "timer started");
        true
    }

    /// Stops the countdown, freezing remaining and elapsed time.
    ///
    /// Time since the last tick is not flushed here; callers tick first.
    pub fn pause(&mut self) -> bool {
        if !self.state.running {
            return false;
        }
        self.state.running = false;
        self.last_observed = None;
        debug!(phase = %self.state.phase, remaining = self.state.remaining_secs, "timer paused");
        true
    }

    /// Restarts the current phase from its full length, stopped.
    pub fn reset(&mut self, settings: &Settings) {
        let phase = self.state.phase;
        self.enter(phase, settings);
    }

    /// Back to the initial state, counters included.
    pub fn reinitialize(&mut self, settings: &Settings) {
        *self = Self::new(settings);
    }

    /// Picks up new durations if the current phase has not been touched yet.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.state.current_cycle = self.state.current_cycle.min(settings.total_cycles.max(1));
        if !self.state.running && self.state.elapsed_secs == 0.0 && self.pending.is_none() {
            let phase = self.state.phase;
            self.enter(phase, settings);
        }
    }

    /// Feeds the wall-clock time elapsed since the last observation.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Expiry> {
        if !self.state.running {
            return None;
        }
        let last = self.last_observed.replace(now).unwrap_or(now);
        let delta = (now - last).num_milliseconds() as f64 / 1000.0;
        if delta < 0.0 {
            warn!(delta, "clock moved backward, ignoring tick delta");
            return None;
        }
        self.advance(delta)
    }

    /// Moves time forward by `delta_secs`.
    ///
    /// Reports the expiry once when the phase runs out, however far the
    /// delta overshoots. Excess time is dropped.
    pub fn advance(&mut self, delta_secs: f64) -> Option<Expiry> {
        if !self.state.running || self.pending.is_some() {
            return None;
        }
        let delta = delta_secs.max(0.0);
        self.state.remaining_secs -= delta;
        self.state.elapsed_secs += delta;
        if self.state.remaining_secs > 0.0 {
            return None;
        }

        self.state.remaining_secs = 0.0;
        self.state.running = false;
        self.last_observed = None;
        let expiry = Expiry {
            phase: self.state.phase,
            elapsed_secs: self.state.elapsed_secs.min(self.total_secs),
            started_at: self.phase_started_at,
        };
        self.pending = Some(expiry);
        debug!(phase = %expiry.phase, "phase expired");
        Some(expiry)
    }

    /// Moves past an expired phase. Returns `None` if nothing expired.
    pub fn complete(&mut self, settings: &Settings, now: DateTime<Utc>) -> Option<Transition> {
        self.pending.take()?;

        let from = self.state.phase;
        let mut cycle_completed = false;
        let to = match from {
            Phase::Focus => {
                self.state.pomodoros_completed_in_cycle += 1;
                next_after_focus(self.state.pomodoros_completed_in_cycle, settings)
            }
            Phase::ShortBreak => Phase::Focus,
            Phase::LongBreak => {
                cycle_completed = true;
                self.state.current_cycle =
                    (self.state.current_cycle + 1).min(settings.total_cycles.max(1));
                Phase::Focus
            }
        };

        self.enter(to, settings);
        if settings.auto_start {
            self.start(now);
        }
        debug!(%from, %to, cycle = self.state.current_cycle, "phase completed");
        Some(Transition {
            from,
            to,
            cycle_completed,
        })
    }

    /// Abandons the current phase without touching any counter.
    ///
    /// A running timer keeps running in the next phase.
    pub fn skip(&mut self, settings: &Settings, now: DateTime<Utc>) -> Phase {
        let next = match self.state.phase {
            Phase::Focus => next_after_focus(self.state.pomodoros_completed_in_cycle + 1, settings),
            Phase::ShortBreak | Phase::LongBreak => Phase::Focus,
        };
        let was_running = self.state.running;
        self.enter(next, settings);
        if was_running || settings.auto_start {
            self.start(now);
        }
        debug!(to = %next, "phase skipped");
        next
    }

    fn enter(&mut self, phase: Phase, settings: &Settings) {
        self.total_secs = settings.phase_secs(phase);
        self.state.phase = phase;
        self.state.remaining_secs = self.total_secs;
        self.state.elapsed_secs = 0.0;
        self.state.running = false;
        self.last_observed = None;
        self.phase_started_at = None;
        self.pending = None;
    }
}

fn next_after_focus(completed: u32, settings: &Settings) -> Phase {
    if completed % settings.long_break_every.max(1) == 0 {
        Phase::LongBreak
    } else {
        Phase::ShortBreak
    }
}

/// Formats the one-line status shown by the terminal front end.
pub fn format_title(machine: &PhaseMachine, direction: CountDirection) -> String {
    let time = format_time(machine.display_secs(direction));
    let icon = if !machine.is_running() {
        "⏸"
    } else if machine.phase().is_break() {
        "☕"
    } else {
        "🍅"
    };
    format!("{icon} {} {time}", machine.phase().label())
}

/// Formats time in MM:SS format.
pub fn format_time(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
