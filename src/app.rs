//! Main engine state and logic.
//!
//! [`Engine`] is the single owner of the timer, the session log, the daily
//! counters and the notes. Every mutation goes through its methods, and
//! state is written to the store only at the end of an operation.

use crate::clock::{Clock, SystemClock};
use crate::daily::{DailyAggregator, Rollover};
use crate::metrics::{self, DayPoint};
use crate::models::{DailyStats, HistoryRecord, Phase, PhaseTotals, SessionLogEntry, Settings, SettingsError};
use crate::notes::{Lap, Notes};
use crate::persistence::{Database, DatabaseError, ImportError, PersistedState, StateStore, STATE_VERSION};
use crate::session::SessionLog;
use crate::timer::{self, Expiry, PhaseMachine};
use chrono::Duration;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of days in the dashboard's focus chart.
pub const SERIES_DAYS: usize = 14;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Import failed: {0}")]
    Import(#[from] ImportError),
    #[error("Export failed: {0}")]
    Export(#[from] serde_json::Error),
}

/// Events that should trigger notifications/sounds in the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    FocusComplete { count_today: u32, next: Phase },
    BreakComplete { phase: Phase, cycle_completed: bool },
}

/// Everything a front end needs to draw the timer and the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub phase: Phase,
    pub running: bool,
    pub time: String,
    pub progress: f64,
    pub focus_minutes_today: u32,
    pub pomodoros_today: u32,
    pub daily_goal_mins: u32,
    pub goal_progress: f64,
    pub current_cycle: u32,
    pub total_cycles: u32,
    pub cycle_progress: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub daily_series: Vec<DayPoint>,
    pub phase_distribution: PhaseTotals,
}

pub struct Engine {
    settings: Settings,
    timer: PhaseMachine,
    log: SessionLog,
    daily: DailyAggregator,
    notes: Notes,
    next_tag: Option<String>,
    clock: Box<dyn Clock>,
    store: Box<dyn StateStore>,
    dirty: bool,
}

impl Engine {
    /// Creates an engine on the default database and the system clock.
    pub fn new() -> Result<Self, AppError> {
        let db = Database::new()?;
        Self::with_store(Box::new(db), Box::new(SystemClock))
    }

    /// Creates an engine on the given store, restoring what it holds.
    pub fn with_store(store: Box<dyn StateStore>, clock: Box<dyn Clock>) -> Result<Self, AppError> {
        let loaded = store.load()?;
        let today = clock.today();

        let mut engine = match loaded {
            Some(state) => {
                info!(sessions = state.session_log.len(), days = state.history.len(), "state loaded");
                Self::from_snapshot(state, clock, store)
            }
            None => {
                info!("no saved state, starting fresh");
                let settings = Settings::default();
                Self {
                    timer: PhaseMachine::new(&settings),
                    settings,
                    log: SessionLog::new(),
                    daily: DailyAggregator::new(today),
                    notes: Notes::default(),
                    next_tag: None,
                    clock,
                    store,
                    dirty: true,
                }
            }
        };

        engine.refresh_day();
        if engine.dirty {
            engine.persist();
        }
        Ok(engine)
    }

    fn from_snapshot(state: PersistedState, clock: Box<dyn Clock>, store: Box<dyn StateStore>) -> Self {
        let settings = match state.settings.validate() {
            Ok(()) => state.settings,
            Err(e) => {
                warn!("stored settings rejected ({e}), using defaults");
                Settings::default()
            }
        };
        let mut daily = DailyAggregator::from_parts(state.daily, state.history);
        daily.set_retention(settings.history_retention_days);

        Self {
            timer: PhaseMachine::restore(state.timer, &settings),
            log: SessionLog::from_parts(state.session_log, state.lifetime_totals),
            daily,
            notes: state.notes,
            settings,
            next_tag: None,
            clock,
            store,
            dirty: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn timer(&self) -> &PhaseMachine {
        &self.timer
    }

    pub fn today(&self) -> &DailyStats {
        self.daily.today()
    }

    pub fn history(&self) -> &[HistoryRecord] {
        self.daily.history()
    }

    /// Completed phases, newest first.
    pub fn session_log(&self) -> &[SessionLogEntry] {
        self.log.entries()
    }

    pub fn lifetime_totals(&self) -> PhaseTotals {
        self.log.lifetime_totals()
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    /// True while the last save failed and has not been retried successfully.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Tag attached to the next recorded session.
    pub fn next_tag(&self) -> Option<&str> {
        self.next_tag.as_deref()
    }

    pub fn set_next_tag(&mut self, tag: Option<String>) {
        self.next_tag = tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    }

    /// Starts the timer. Returns false if it was already running.
    pub fn start(&mut self) -> bool {
        self.refresh_day();
        let started = self.timer.start(self.clock.now());
        if started {
            self.persist();
        }
        started
    }

    /// Pauses the timer after accounting for the time since the last tick.
    ///
    /// The flush can finish the phase, in which case its event is returned.
    pub fn pause(&mut self) -> Option<CompletionEvent> {
        let (_, completion) = self.tick();
        if self.timer.pause() {
            self.persist();
        }
        completion
    }

    /// Starts a stopped timer or pauses a running one.
    pub fn toggle(&mut self) -> Option<CompletionEvent> {
        if self.timer.is_running() {
            self.pause()
        } else {
            self.start();
            None
        }
    }

    /// Abandons the current phase without booking it.
    pub fn skip(&mut self) -> Phase {
        let next = self.timer.skip(&self.settings, self.clock.now());
        self.persist();
        next
    }

    /// Restarts the current phase from its full length.
    pub fn reset(&mut self) {
        self.timer.reset(&self.settings);
        self.persist();
    }

    /// Advances the timer to the current time.
    /// Returns (state_changed, optional_completion_event).
    pub fn tick(&mut self) -> (bool, Option<CompletionEvent>) {
        self.refresh_day();
        if !self.timer.is_running() {
            return (false, None);
        }

        match self.timer.tick(self.clock.now()) {
            Some(expiry) => {
                let event = self.finish_phase(expiry);
                self.persist();
                (true, Some(event))
            }
            None => (true, None),
        }
    }

    fn finish_phase(&mut self, expiry: Expiry) -> CompletionEvent {
        let now = self.clock.now();
        let today = self.clock.today();
        self.daily.rollover_if_needed(today);

        let started_at = expiry
            .started_at
            .unwrap_or_else(|| now - Duration::milliseconds((expiry.elapsed_secs * 1000.0) as i64));
        let entry = self.log.record_completion(
            expiry.phase,
            expiry.elapsed_secs,
            started_at,
            now,
            self.next_tag.take(),
        );
        match expiry.phase {
            Phase::Focus => self.daily.record_focus(entry.minutes),
            phase => self.daily.record_break(phase, entry.minutes),
        }

        let transition = match self.timer.complete(&self.settings, now) {
            Some(transition) => transition,
            None => {
                warn!(phase = %expiry.phase, "expiry reported without a pending phase");
                return CompletionEvent::BreakComplete {
                    phase: expiry.phase,
                    cycle_completed: false,
                };
            }
        };
        if transition.cycle_completed {
            self.daily.record_cycle();
        }

        match transition.from {
            Phase::Focus => CompletionEvent::FocusComplete {
                count_today: self.daily.today().pomodoros_today,
                next: transition.to,
            },
            phase => CompletionEvent::BreakComplete {
                phase,
                cycle_completed: transition.cycle_completed,
            },
        }
    }

    /// Archives yesterday's counters once the date has changed.
    fn refresh_day(&mut self) {
        if let Rollover::Archived(_) = self.daily.rollover_if_needed(self.clock.today()) {
            self.persist();
        }
    }

    /// Validates and applies new settings. Invalid settings leave the
    /// current ones in place.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.timer.apply_settings(&settings);
        self.daily.set_retention(settings.history_retention_days);
        self.settings = settings;
        info!("settings updated");
        self.persist();
        Ok(())
    }

    /// Updates a setting in place and saves it.
    pub fn update_setting<F>(&mut self, updater: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings.clone();
        updater(&mut settings);
        self.update_settings(settings)
    }

    /// Deletes a session log entry by id.
    pub fn delete_session(&mut self, id: &str) -> Option<SessionLogEntry> {
        let removed = self.log.delete(id)?;
        self.persist();
        Some(removed)
    }

    /// Records the current timer display as a lap.
    pub fn lap(&mut self) -> Lap {
        let display = timer::format_time(self.timer.display_secs(self.settings.count_direction));
        let lap = self
            .notes
            .add_lap(self.clock.now(), self.timer.phase(), display)
            .clone();
        self.persist();
        lap
    }

    /// Runs `f` on the notes and saves them afterwards.
    pub fn edit_notes<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Notes) -> R,
    {
        let result = f(&mut self.notes);
        self.persist();
        result
    }

    /// Clears statistics, history, the session log and laps. Settings and
    /// the other notes stay.
    pub fn reset_stats(&mut self) {
        self.daily.reset(self.clock.today());
        self.log.clear();
        self.notes.laps.clear();
        info!("statistics reset");
        self.persist();
    }

    /// Returns everything to first-launch state.
    pub fn reset_all(&mut self) {
        self.settings = Settings::default();
        self.timer.reinitialize(&self.settings);
        self.log.clear();
        self.daily = DailyAggregator::new(self.clock.today());
        self.notes = Notes::default();
        self.next_tag = None;
        info!("all data reset");
        self.persist();
    }

    /// Serializable snapshot of the current state.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            version: STATE_VERSION,
            settings: self.settings.clone(),
            timer: self.timer.checkpoint(),
            session_log: self.log.entries().to_vec(),
            lifetime_totals: self.log.lifetime_totals(),
            daily: self.daily.today().clone(),
            history: self.daily.history().to_vec(),
            notes: self.notes.clone(),
        }
    }

    pub fn export_json(&self) -> Result<String, AppError> {
        Ok(self.snapshot().to_json()?)
    }

    /// Replaces the whole state with an imported snapshot.
    ///
    /// The snapshot is validated first; on error nothing changes.
    pub fn import_json(&mut self, json: &str) -> Result<(), AppError> {
        let state = PersistedState::from_json(json)?;
        let settings = state.settings;

        self.timer = PhaseMachine::restore(state.timer, &settings);
        self.log = SessionLog::from_parts(state.session_log, state.lifetime_totals);
        self.daily = DailyAggregator::from_parts(state.daily, state.history);
        self.daily.set_retention(settings.history_retention_days);
        self.notes = state.notes;
        self.settings = settings;
        self.next_tag = None;
        info!("state imported");
        self.persist();
        Ok(())
    }

    /// Writes the current state. Failures are logged and retried on the
    /// next mutation.
    fn persist(&mut self) {
        let snapshot = self.snapshot();
        match self.store.save(&snapshot) {
            Ok(()) => {
                if self.dirty {
                    debug!("pending state saved");
                }
                self.dirty = false;
            }
            Err(e) => {
                warn!("failed to save state, keeping it in memory: {e}");
                self.dirty = true;
            }
        }
    }

    /// Focus minutes for the last `n` days, oldest first.
    pub fn daily_series(&self, n: usize) -> Vec<DayPoint> {
        metrics::daily_series(self.daily.history(), self.daily.today(), self.clock.today(), n)
    }

    /// Minutes per phase over the configured window of recent sessions.
    pub fn phase_distribution(&self) -> PhaseTotals {
        metrics::phase_distribution(self.log.entries(), self.settings.distribution_window)
    }

    pub fn dashboard(&self) -> Dashboard {
        let state = self.timer.state();
        let today = self.daily.today();
        let history = self.daily.history();
        let date = self.clock.today();

        Dashboard {
            phase: state.phase,
            running: state.running,
            time: timer::format_time(self.timer.display_secs(self.settings.count_direction)),
            progress: self.timer.progress(),
            focus_minutes_today: today.focus_minutes_today,
            pomodoros_today: today.pomodoros_today,
            daily_goal_mins: self.settings.daily_goal_mins,
            goal_progress: metrics::goal_progress(
                today.focus_minutes_today,
                self.settings.daily_goal_mins,
            ),
            current_cycle: state.current_cycle,
            total_cycles: self.settings.total_cycles,
            cycle_progress: metrics::cycle_progress(state.current_cycle, self.settings.total_cycles),
            current_streak: metrics::current_streak(history, today, date),
            longest_streak: metrics::longest_streak(history, today),
            daily_series: self.daily_series(SERIES_DAYS),
            phase_distribution: self.phase_distribution(),
        }
    }

    /// One-line status for the terminal.
    pub fn title(&self) -> String {
        timer::format_title(&self.timer, self.settings.count_direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::persistence::Database;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn create_test_engine() -> (Engine, ManualClock) {
        let clock = ManualClock::at_2024();
        let db = Database::new_in_memory().unwrap();
        let engine = Engine::with_store(Box::new(db), Box::new(clock.clone())).unwrap();
        (engine, clock)
    }

    /// Runs the current phase to completion.
    fn complete_phase(engine: &mut Engine, clock: &ManualClock) -> CompletionEvent {
        engine.start();
        clock.advance_secs(engine.timer().total_secs());
        let (_, event) = engine.tick();
        event.expect("phase should complete")
    }

    /// A store shared with the test so saved snapshots can be inspected.
    #[derive(Clone, Default)]
    struct MemoryStore {
        saved: Arc<Mutex<Option<PersistedState>>>,
        failing: Arc<AtomicBool>,
        saves: Arc<Mutex<usize>>,
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<Option<PersistedState>, DatabaseError> {
            Ok(self.saved.lock().unwrap().clone())
        }

        fn save(&mut self, state: &PersistedState) -> Result<(), DatabaseError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DatabaseError::DirectoryCreation);
            }
            *self.saves.lock().unwrap() += 1;
            *self.saved.lock().unwrap() = Some(state.clone());
            Ok(())
        }
    }

    #[test]
    fn test_engine_initial_state() {
        let (engine, _) = create_test_engine();
        assert_eq!(engine.settings(), &Settings::default());
        assert_eq!(engine.timer().phase(), Phase::Focus);
        assert!(!engine.timer().is_running());
        assert_eq!(engine.today().date_key, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(engine.session_log().is_empty());
        assert!(!engine.is_dirty());
    }

    #[test]
    fn test_start_and_tick() {
        let (mut engine, clock) = create_test_engine();
        assert!(engine.start());
        assert!(!engine.start());

        clock.advance_secs(68.0);
        let (changed, event) = engine.tick();
        assert!(changed);
        assert!(event.is_none());
        assert_eq!(engine.title(), "🍅 Focus 23:52");
    }

    #[test]
    fn test_tick_returns_correct_flags() {
        let (mut engine, clock) = create_test_engine();

        // Stopped - no changes
        let (changed, event) = engine.tick();
        assert!(!changed);
        assert!(event.is_none());

        // Running - changes but not completed
        engine.start();
        clock.advance_secs(1.0);
        let (changed, event) = engine.tick();
        assert!(changed);
        assert!(event.is_none());

        // Paused - no changes
        engine.pause();
        clock.advance_secs(1.0);
        let (changed, event) = engine.tick();
        assert!(!changed);
        assert!(event.is_none());
    }

    #[test]
    fn test_pause_flushes_elapsed_time() {
        let (mut engine, clock) = create_test_engine();
        engine.start();
        clock.advance_secs(100.0);
        assert!(engine.pause().is_none());
        assert_eq!(engine.timer().state().remaining_secs, 1400.0);

        // Time while paused is not counted.
        clock.advance_secs(500.0);
        engine.start();
        clock.advance_secs(100.0);
        engine.tick();
        assert_eq!(engine.timer().state().remaining_secs, 1300.0);
    }

    #[test]
    fn test_rapid_toggling_is_safe() {
        let (mut engine, clock) = create_test_engine();
        for _ in 0..50 {
            engine.toggle();
            clock.advance_secs(0.5);
        }
        engine.pause();
        let remaining = engine.timer().state().remaining_secs;
        assert!(remaining >= 0.0);
        assert_eq!(remaining, 1500.0 - 12.5);
    }

    #[test]
    fn test_four_focus_scenario() {
        let (mut engine, clock) = create_test_engine();
        let mut phases = vec![engine.timer().phase()];

        for round in 1..=4 {
            let event = complete_phase(&mut engine, &clock);
            phases.push(engine.timer().phase());
            if round < 4 {
                assert_eq!(
                    event,
                    CompletionEvent::FocusComplete {
                        count_today: round,
                        next: Phase::ShortBreak
                    }
                );
                complete_phase(&mut engine, &clock);
                phases.push(engine.timer().phase());
            } else {
                assert_eq!(
                    event,
                    CompletionEvent::FocusComplete {
                        count_today: 4,
                        next: Phase::LongBreak
                    }
                );
            }
        }

        assert_eq!(
            phases,
            vec![
                Phase::Focus,
                Phase::ShortBreak,
                Phase::Focus,
                Phase::ShortBreak,
                Phase::Focus,
                Phase::ShortBreak,
                Phase::Focus,
                Phase::LongBreak,
            ]
        );
        let state = engine.timer().state();
        assert_eq!(state.pomodoros_completed_in_cycle % engine.settings().long_break_every, 0);
        assert_eq!(state.current_cycle, 1);
        assert_eq!(engine.today().focus_minutes_today, 100);
        assert_eq!(engine.today().pomodoros_today, 4);

        let event = complete_phase(&mut engine, &clock);
        assert_eq!(
            event,
            CompletionEvent::BreakComplete {
                phase: Phase::LongBreak,
                cycle_completed: true
            }
        );
        assert_eq!(engine.timer().state().current_cycle, 2);
        assert_eq!(engine.today().cycles_completed_today, 1);
        assert_eq!(engine.today().phase_totals.short_break, 15);
        assert_eq!(engine.today().phase_totals.long_break, 15);
        assert_eq!(engine.session_log().len(), 8);
    }

    #[test]
    fn test_overshoot_records_single_session() {
        let (mut engine, clock) = create_test_engine();
        engine.start();
        clock.advance_secs(10_000.0);
        let (_, event) = engine.tick();
        assert!(event.is_some());

        clock.advance_secs(10_000.0);
        let (_, event) = engine.tick();
        assert!(event.is_none());

        assert_eq!(engine.session_log().len(), 1);
        assert_eq!(engine.session_log()[0].minutes, 25);
        assert_eq!(engine.timer().phase(), Phase::ShortBreak);
        assert_eq!(engine.timer().state().remaining_secs, 300.0);
    }

    #[test]
    fn test_session_entry_timestamps_and_tag() {
        let (mut engine, clock) = create_test_engine();
        let started = clock.now();
        engine.set_next_tag(Some("  biology ".into()));
        complete_phase(&mut engine, &clock);

        let entry = &engine.session_log()[0];
        assert_eq!(entry.phase, Phase::Focus);
        assert_eq!(entry.started_at, started);
        assert_eq!(entry.ended_at, clock.now());
        assert_eq!(entry.tag.as_deref(), Some("biology"));
        assert!(engine.next_tag().is_none());
    }

    #[test]
    fn test_skip_records_nothing() {
        let (mut engine, clock) = create_test_engine();
        engine.start();
        clock.advance_secs(600.0);
        engine.tick();

        assert_eq!(engine.skip(), Phase::ShortBreak);
        assert!(engine.session_log().is_empty());
        assert_eq!(engine.today().focus_minutes_today, 0);
        assert_eq!(engine.timer().state().pomodoros_completed_in_cycle, 0);
    }

    #[test]
    fn test_reset_restores_phase() {
        let (mut engine, clock) = create_test_engine();
        engine.start();
        clock.advance_secs(600.0);
        engine.tick();
        engine.reset();
        assert_eq!(engine.timer().state().remaining_secs, 1500.0);
        assert!(!engine.timer().is_running());
    }

    #[test]
    fn test_auto_start_continues_into_break() {
        let (mut engine, clock) = create_test_engine();
        engine.update_setting(|s| s.auto_start = true).unwrap();
        complete_phase(&mut engine, &clock);
        assert!(engine.timer().is_running());

        clock.advance_secs(60.0);
        engine.tick();
        assert_eq!(engine.timer().state().remaining_secs, 240.0);
    }

    #[test]
    fn test_day_rollover_archives_history() {
        let (mut engine, clock) = create_test_engine();
        complete_phase(&mut engine, &clock);
        complete_phase(&mut engine, &clock);
        complete_phase(&mut engine, &clock);
        assert_eq!(engine.today().focus_minutes_today, 50);

        clock.set_today(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        engine.tick();
        engine.tick();

        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history()[0].date_key, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(engine.history()[0].focus_minutes, 50);
        assert_eq!(engine.history()[0].pomodoros, 2);
        assert_eq!(engine.today().date_key, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(engine.today().focus_minutes_today, 0);
    }

    #[test]
    fn test_completion_after_midnight_counts_for_new_day() {
        let (mut engine, clock) = create_test_engine();
        engine.start();
        clock.advance_secs(1500.0);
        clock.set_today(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        engine.tick();

        assert_eq!(engine.history()[0].focus_minutes, 0);
        assert_eq!(engine.today().focus_minutes_today, 25);
    }

    #[test]
    fn test_clock_skew_keeps_today() {
        let (mut engine, clock) = create_test_engine();
        complete_phase(&mut engine, &clock);
        clock.set_today(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        engine.tick();
        assert!(engine.history().is_empty());
        assert_eq!(engine.today().focus_minutes_today, 25);
    }

    #[test]
    fn test_update_settings() {
        let (mut engine, _) = create_test_engine();
        engine.update_setting(|s| s.focus_mins = 30).unwrap();

        assert_eq!(engine.settings().focus_mins, 30);
        assert_eq!(engine.timer().state().remaining_secs, 1800.0);
        assert_eq!(engine.snapshot().settings.focus_mins, 30);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let (mut engine, _) = create_test_engine();
        let result = engine.update_setting(|s| s.long_break_mins = 0);
        assert!(result.is_err());
        assert_eq!(engine.settings(), &Settings::default());
    }

    #[test]
    fn test_daily_series_on_fresh_engine() {
        let (mut engine, clock) = create_test_engine();
        complete_phase(&mut engine, &clock);

        let series = engine.daily_series(7);
        assert_eq!(series.len(), 7);
        assert_eq!(series[6].focus_minutes, 25);
        assert!(series[..6].iter().all(|p| p.focus_minutes == 0));
    }

    #[test]
    fn test_dashboard() {
        let (mut engine, clock) = create_test_engine();
        for _ in 0..2 {
            complete_phase(&mut engine, &clock);
            complete_phase(&mut engine, &clock);
        }

        let dashboard = engine.dashboard();
        assert_eq!(dashboard.phase, Phase::Focus);
        assert_eq!(dashboard.time, "25:00");
        assert_eq!(dashboard.progress, 0.0);
        assert_eq!(dashboard.focus_minutes_today, 50);
        assert_eq!(dashboard.pomodoros_today, 2);
        assert!((dashboard.goal_progress - 50.0 / 240.0).abs() < 1e-9);
        assert_eq!(dashboard.cycle_progress, 0.0);
        assert_eq!(dashboard.current_streak, 1);
        assert_eq!(dashboard.daily_series.len(), SERIES_DAYS);
        assert_eq!(dashboard.phase_distribution.focus, 50);
        assert_eq!(dashboard.phase_distribution.short_break, 10);
    }

    #[test]
    fn test_phase_distribution_window() {
        let (mut engine, clock) = create_test_engine();
        engine.update_setting(|s| s.distribution_window = Some(1)).unwrap();
        complete_phase(&mut engine, &clock);
        complete_phase(&mut engine, &clock);

        let totals = engine.phase_distribution();
        assert_eq!(totals.focus, 0);
        assert_eq!(totals.short_break, 5);
    }

    #[test]
    fn test_delete_session() {
        let (mut engine, clock) = create_test_engine();
        complete_phase(&mut engine, &clock);
        let id = engine.session_log()[0].id.clone();

        assert!(engine.delete_session(&id).is_some());
        assert!(engine.delete_session(&id).is_none());
        assert!(engine.session_log().is_empty());
    }

    #[test]
    fn test_lap_and_notes() {
        let (mut engine, clock) = create_test_engine();
        engine.start();
        clock.advance_secs(60.0);
        engine.tick();

        let lap = engine.lap();
        assert_eq!(lap.display, "24:00");
        assert_eq!(lap.phase, Phase::Focus);

        engine.edit_notes(|notes| notes.add_todo("Revise optics", "").is_some());
        assert_eq!(engine.notes().todos.len(), 1);
        assert_eq!(engine.notes().laps.len(), 1);
    }

    #[test]
    fn test_reset_stats() {
        let (mut engine, clock) = create_test_engine();
        complete_phase(&mut engine, &clock);
        engine.lap();
        engine.edit_notes(|notes| notes.add_feed("https://example.org/rss"));
        engine.reset_stats();

        assert!(engine.session_log().is_empty());
        assert_eq!(engine.today().focus_minutes_today, 0);
        assert!(engine.notes().laps.is_empty());
        assert_eq!(engine.notes().feeds.len(), 1);
    }

    #[test]
    fn test_reset_all() {
        let (mut engine, clock) = create_test_engine();
        engine.update_setting(|s| s.focus_mins = 50).unwrap();
        complete_phase(&mut engine, &clock);
        engine.edit_notes(|notes| notes.add_feed("https://example.org/rss"));
        engine.reset_all();

        assert_eq!(engine.settings(), &Settings::default());
        assert_eq!(engine.timer().phase(), Phase::Focus);
        assert_eq!(engine.timer().state().pomodoros_completed_in_cycle, 0);
        assert!(engine.session_log().is_empty());
        assert_eq!(engine.notes(), &Notes::default());
    }

    #[test]
    fn test_export_import_round_trip() {
        let (mut engine, clock) = create_test_engine();
        engine.set_next_tag(Some("chemistry".into()));
        complete_phase(&mut engine, &clock);
        complete_phase(&mut engine, &clock);
        clock.set_today(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        engine.tick();
        engine.start();
        clock.advance_secs(123.25);
        engine.pause();
        engine.edit_notes(|notes| notes.add_formula("Ohm's law", "V = IR").is_some());

        let exported = engine.export_json().unwrap();
        let (mut other, _) = create_test_engine();
        other.import_json(&exported).unwrap();

        assert_eq!(other.snapshot(), engine.snapshot());
        assert_eq!(other.export_json().unwrap(), exported);
    }

    #[test]
    fn test_malformed_import_leaves_state_untouched() {
        let (mut engine, clock) = create_test_engine();
        complete_phase(&mut engine, &clock);
        let before = engine.snapshot();

        let mut value: serde_json::Value = serde_json::from_str(&engine.export_json().unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("daily");
        let result = engine.import_json(&value.to_string());

        assert!(matches!(
            result,
            Err(AppError::Import(ImportError::MissingField("daily")))
        ));
        assert_eq!(engine.snapshot(), before);
        assert!(engine.import_json("{ not json").is_err());
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn test_completion_after_importing_huge_counters() {
        let (mut engine, clock) = create_test_engine();
        let mut value: serde_json::Value = serde_json::from_str(&engine.export_json().unwrap()).unwrap();
        value["daily"]["focus_minutes_today"] = serde_json::json!(u32::MAX);
        value["daily"]["pomodoros_today"] = serde_json::json!(u32::MAX);
        value["daily"]["cycles_completed_today"] = serde_json::json!(u32::MAX);
        value["daily"]["phase_totals"]["focus"] = serde_json::json!(u32::MAX);
        value["lifetime_totals"]["focus"] = serde_json::json!(u32::MAX);
        value["history"] = serde_json::json!([{
            "date_key": "2023-12-31",
            "focus_minutes": u32::MAX,
            "pomodoros": u32::MAX,
            "cycles_completed": u32::MAX
        }]);
        engine.import_json(&value.to_string()).unwrap();

        let event = complete_phase(&mut engine, &clock);
        assert_eq!(
            event,
            CompletionEvent::FocusComplete {
                count_today: u32::MAX,
                next: Phase::ShortBreak
            }
        );
        assert_eq!(engine.today().focus_minutes_today, u32::MAX);
        assert_eq!(engine.today().phase_totals.focus, u32::MAX);
        assert_eq!(engine.lifetime_totals().focus, u32::MAX);
        assert_eq!(engine.session_log().len(), 1);

        let dashboard = engine.dashboard();
        assert_eq!(dashboard.goal_progress, 1.0);
        assert_eq!(dashboard.longest_streak, 2);
    }

    #[test]
    fn test_state_survives_restart() {
        let clock = ManualClock::at_2024();
        let store = MemoryStore::default();

        let mut engine = Engine::with_store(Box::new(store.clone()), Box::new(clock.clone())).unwrap();
        complete_phase(&mut engine, &clock);
        engine.start();
        clock.advance_secs(30.0);
        engine.pause();
        let before = engine.snapshot();
        drop(engine);

        let engine = Engine::with_store(Box::new(store), Box::new(clock.clone())).unwrap();
        assert_eq!(engine.snapshot(), before);
        assert_eq!(engine.timer().phase(), Phase::ShortBreak);
        assert_eq!(engine.timer().state().remaining_secs, 270.0);
        assert!(!engine.timer().is_running());
    }

    #[test]
    fn test_invalid_stored_settings_fall_back_to_defaults() {
        let clock = ManualClock::at_2024();
        let store = MemoryStore::default();
        let mut engine = Engine::with_store(Box::new(store.clone()), Box::new(clock.clone())).unwrap();
        engine.update_setting(|s| s.focus_mins = 40).unwrap();
        drop(engine);

        store.saved.lock().unwrap().as_mut().unwrap().settings.focus_mins = 0;
        let engine = Engine::with_store(Box::new(store), Box::new(clock)).unwrap();
        assert_eq!(engine.settings(), &Settings::default());
    }

    #[test]
    fn test_persistence_failure_is_retried() {
        let clock = ManualClock::at_2024();
        let store = MemoryStore::default();
        let mut engine = Engine::with_store(Box::new(store.clone()), Box::new(clock.clone())).unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let event = complete_phase(&mut engine, &clock);
        assert!(matches!(event, CompletionEvent::FocusComplete { .. }));
        assert!(engine.is_dirty());
        // In-memory state is intact.
        assert_eq!(engine.today().focus_minutes_today, 25);

        store.failing.store(false, Ordering::SeqCst);
        engine.start();
        assert!(!engine.is_dirty());
        let saved = store.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.daily.focus_minutes_today, 25);
    }

    #[test]
    fn test_plain_ticks_do_not_save() {
        let clock = ManualClock::at_2024();
        let store = MemoryStore::default();
        let mut engine = Engine::with_store(Box::new(store.clone()), Box::new(clock.clone())).unwrap();
        engine.start();
        let saves = *store.saves.lock().unwrap();

        for _ in 0..10 {
            clock.advance_secs(1.0);
            engine.tick();
        }
        assert_eq!(*store.saves.lock().unwrap(), saves);
    }
}
