//! Today's counters and the archive of past days.

use crate::models::{DailyStats, HistoryRecord, Phase};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// Outcome of a rollover check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    /// Same day, nothing to do.
    Unchanged,
    /// The previous day was archived.
    Archived(HistoryRecord),
    /// The clock reports a date before today's key; stats were kept.
    ClockSkew,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregator {
    today: DailyStats,
    history: Vec<HistoryRecord>,
    retention: Option<usize>,
    /// Clock date of the skew already warned about.
    skew_reported: Option<NaiveDate>,
}

impl DailyAggregator {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            today: DailyStats::new(date),
            history: Vec::new(),
            retention: None,
            skew_reported: None,
        }
    }

    pub fn from_parts(today: DailyStats, history: Vec<HistoryRecord>) -> Self {
        Self {
            today,
            history,
            retention: None,
            skew_reported: None,
        }
    }

    /// Caps the number of archived days. `None` keeps everything.
    pub fn set_retention(&mut self, days: Option<usize>) {
        self.retention = days;
        self.enforce_retention();
    }

    pub fn today(&self) -> &DailyStats {
        &self.today
    }

    /// Archived days in the order they were archived.
    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Clock date of the current backward skew, once it has been warned about.
    pub fn skew_reported(&self) -> Option<NaiveDate> {
        self.skew_reported
    }

    /// Archives today's counters when the date changed.
    ///
    /// Must run before any counter write so stale-day writes never reach
    /// the history.
    pub fn rollover_if_needed(&mut self, current: NaiveDate) -> Rollover {
        if current == self.today.date_key {
            self.skew_reported = None;
            return Rollover::Unchanged;
        }
        if current < self.today.date_key {
            if self.skew_reported == Some(current) {
                debug!(clock_date = %current, "clock still behind the stats date");
            } else {
                warn!(
                    stats_date = %self.today.date_key,
                    clock_date = %current,
                    "clock is behind the stats date, skipping rollover"
                );
                self.skew_reported = Some(current);
            }
            return Rollover::ClockSkew;
        }
        self.skew_reported = None;

        let record = self.today.to_history();
        self.history.push(record);
        self.today = DailyStats::new(current);
        self.enforce_retention();
        info!(date = %record.date_key, focus_minutes = record.focus_minutes, "day archived");
        Rollover::Archived(record)
    }

    /// Books a completed focus session.
    pub fn record_focus(&mut self, minutes: u32) {
        self.today.focus_minutes_today = self.today.focus_minutes_today.saturating_add(minutes);
        self.today.pomodoros_today = self.today.pomodoros_today.saturating_add(1);
        self.today.phase_totals.add(Phase::Focus, minutes);
    }

    /// Books a completed break.
    pub fn record_break(&mut self, phase: Phase, minutes: u32) {
        self.today.phase_totals.add(phase, minutes);
    }

    pub fn record_cycle(&mut self) {
        self.today.cycles_completed_today = self.today.cycles_completed_today.saturating_add(1);
    }

    /// Clears today and the whole history.
    pub fn reset(&mut self, date: NaiveDate) {
        self.today = DailyStats::new(date);
        self.history.clear();
    }

    fn enforce_retention(&mut self) {
        if let Some(days) = self.retention {
            if self.history.len() > days {
                let excess = self.history.len() - days;
                self.history.drain(..excess);
            }
        }
    }
}
