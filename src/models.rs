//! Data models for the Pomotally engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One segment of the pomodoro cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Focus, Phase::ShortBreak, Phase::LongBreak];

    /// Human readable name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, Self::Focus)
    }

    /// Stable storage key, same as the serialized name.
    pub fn key(self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.key() == key)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the display shows time remaining or time elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountDirection {
    Up,
    #[default]
    Down,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

/// User-configurable settings for the timer and the analytics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Duration of a focus session in minutes.
    pub focus_mins: u32,
    /// Duration of a short break in minutes.
    pub short_break_mins: u32,
    /// Duration of a long break in minutes.
    pub long_break_mins: u32,
    /// A long break follows every N-th completed focus session.
    pub long_break_every: u32,
    /// Number of cycles shown in the cycle progress.
    pub total_cycles: u32,
    /// Start the next phase automatically when one completes.
    pub auto_start: bool,
    /// Focus minutes per day considered a full day.
    pub daily_goal_mins: u32,
    pub count_direction: CountDirection,
    /// Tick granularity of the scheduler in milliseconds.
    pub precision_ms: u64,
    /// Whether to play a sound on phase completion.
    pub sound_enabled: bool,
    /// Whether to show desktop notifications.
    pub notifications_enabled: bool,
    /// Only the most recent N sessions feed the phase distribution.
    pub distribution_window: Option<usize>,
    /// Keep at most this many archived days.
    pub history_retention_days: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_mins: 25,
            short_break_mins: 5,
            long_break_mins: 15,
            long_break_every: 4,
            total_cycles: 4,
            auto_start: false,
            daily_goal_mins: 240,
            count_direction: CountDirection::Down,
            precision_ms: 1000,
            sound_enabled: true,
            notifications_enabled: true,
            distribution_window: None,
            history_retention_days: None,
        }
    }
}

impl Settings {
    /// Checks the invariants: every duration and count is positive.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks: [(&'static str, u64); 7] = [
            ("focus_mins", self.focus_mins.into()),
            ("short_break_mins", self.short_break_mins.into()),
            ("long_break_mins", self.long_break_mins.into()),
            ("long_break_every", self.long_break_every.into()),
            ("total_cycles", self.total_cycles.into()),
            ("daily_goal_mins", self.daily_goal_mins.into()),
            ("precision_ms", self.precision_ms),
        ];
        if let Some((field, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::NotPositive { field });
        }
        if self.distribution_window == Some(0) {
            return Err(SettingsError::NotPositive {
                field: "distribution_window",
            });
        }
        if self.history_retention_days == Some(0) {
            return Err(SettingsError::NotPositive {
                field: "history_retention_days",
            });
        }
        Ok(())
    }

    /// Configured length of a phase in minutes.
    pub fn phase_mins(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus_mins,
            Phase::ShortBreak => self.short_break_mins,
            Phase::LongBreak => self.long_break_mins,
        }
    }

    /// Configured length of a phase in seconds.
    pub fn phase_secs(&self, phase: Phase) -> f64 {
        f64::from(self.phase_mins(phase)) * 60.0
    }
}

/// Minutes per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTotals {
    pub focus: u32,
    pub short_break: u32,
    pub long_break: u32,
}

impl PhaseTotals {
    pub fn get(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus,
            Phase::ShortBreak => self.short_break,
            Phase::LongBreak => self.long_break,
        }
    }

    pub fn add(&mut self, phase: Phase, minutes: u32) {
        let slot = match phase {
            Phase::Focus => &mut self.focus,
            Phase::ShortBreak => &mut self.short_break,
            Phase::LongBreak => &mut self.long_break,
        };
        *slot = slot.saturating_add(minutes);
    }

    pub fn total(&self) -> u32 {
        self.focus
            .saturating_add(self.short_break)
            .saturating_add(self.long_break)
    }

    /// Share of each phase in the total, in `Phase::ALL` order.
    pub fn fractions(&self) -> [(Phase, f64); 3] {
        let total = self.total();
        Phase::ALL.map(|phase| {
            let share = if total == 0 {
                0.0
            } else {
                f64::from(self.get(phase)) / f64::from(total)
            };
            (phase, share)
        })
    }
}

/// Record of one completed phase. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub id: String,
    pub phase: Phase,
    pub minutes: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Live counters for the current day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date_key: NaiveDate,
    pub focus_minutes_today: u32,
    pub pomodoros_today: u32,
    pub cycles_completed_today: u32,
    #[serde(default)]
    pub phase_totals: PhaseTotals,
}

impl DailyStats {
    pub fn new(date_key: NaiveDate) -> Self {
        Self {
            date_key,
            focus_minutes_today: 0,
            pomodoros_today: 0,
            cycles_completed_today: 0,
            phase_totals: PhaseTotals::default(),
        }
    }

    /// Snapshot of these counters for the history.
    pub fn to_history(&self) -> HistoryRecord {
        HistoryRecord {
            date_key: self.date_key,
            focus_minutes: self.focus_minutes_today,
            pomodoros: self.pomodoros_today,
            cycles_completed: self.cycles_completed_today,
        }
    }
}

/// Archived counters of a finished day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date_key: NaiveDate,
    pub focus_minutes: u32,
    pub pomodoros: u32,
    pub cycles_completed: u32,
}
