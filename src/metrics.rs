//! Chart-ready projections of the history and the session log.
//!
//! Everything here is a pure function of engine state.

use crate::models::{DailyStats, HistoryRecord, PhaseTotals, SessionLogEntry};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Focus minutes of one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayPoint {
    pub date: NaiveDate,
    pub focus_minutes: u32,
}

/// Focus minutes per day from the archive plus today's live counters.
fn focus_by_day(history: &[HistoryRecord], live: &DailyStats) -> BTreeMap<NaiveDate, u32> {
    let mut days = BTreeMap::new();
    for record in history {
        let minutes = days.entry(record.date_key).or_insert(0u32);
        *minutes = minutes.saturating_add(record.focus_minutes);
    }
    let minutes = days.entry(live.date_key).or_insert(0);
    *minutes = minutes.saturating_add(live.focus_minutes_today);
    days
}

/// The last `n` calendar days ending at `today`, oldest first.
///
/// Days without data are present with zero minutes. When the clock is
/// behind the live stats date, the series ends at the live date instead.
pub fn daily_series(
    history: &[HistoryRecord],
    live: &DailyStats,
    today: NaiveDate,
    n: usize,
) -> Vec<DayPoint> {
    let days = focus_by_day(history, live);
    let end = today.max(live.date_key);
    (0..n)
        .rev()
        .filter_map(|offset| end.checked_sub_days(Days::new(offset as u64)))
        .map(|date| DayPoint {
            date,
            focus_minutes: days.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

/// Minutes per phase over the `window` most recent sessions, or all of them.
pub fn phase_distribution(entries: &[SessionLogEntry], window: Option<usize>) -> PhaseTotals {
    let take = window.unwrap_or(entries.len());
    entries
        .iter()
        .take(take)
        .fold(PhaseTotals::default(), |mut totals, entry| {
            totals.add(entry.phase, entry.minutes);
            totals
        })
}

/// Consecutive focused days ending today.
///
/// A day without focus yet does not break the streak until it is over, so
/// the count starts from yesterday in that case.
pub fn current_streak(history: &[HistoryRecord], live: &DailyStats, today: NaiveDate) -> u32 {
    let days = focus_by_day(history, live);
    let focused = |date: &NaiveDate| days.get(date).is_some_and(|minutes| *minutes > 0);

    let mut cursor = if focused(&today) {
        Some(today)
    } else {
        today.pred_opt()
    };
    let mut streak = 0;
    while let Some(date) = cursor.filter(focused) {
        streak += 1;
        cursor = date.pred_opt();
    }
    streak
}

/// Longest run of consecutive focused days ever recorded.
pub fn longest_streak(history: &[HistoryRecord], live: &DailyStats) -> u32 {
    let days = focus_by_day(history, live);
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for (date, _) in days.iter().filter(|(_, minutes)| **minutes > 0) {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(*date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*date);
    }
    longest
}

/// Today's focus against the daily goal, in 0..=1.
pub fn goal_progress(focus_minutes: u32, goal_minutes: u32) -> f64 {
    if goal_minutes == 0 {
        return 0.0;
    }
    (f64::from(focus_minutes) / f64::from(goal_minutes)).min(1.0)
}

/// Completed cycles against the configured number, in 0..=1.
pub fn cycle_progress(current_cycle: u32, total_cycles: u32) -> f64 {
    if total_cycles == 0 {
        return 0.0;
    }
    (f64::from(current_cycle.saturating_sub(1)) / f64::from(total_cycles)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phase;
    use chrono::{DateTime, Utc};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn record(date: NaiveDate, focus_minutes: u32) -> HistoryRecord {
        HistoryRecord {
            date_key: date,
            focus_minutes,
            pomodoros: focus_minutes / 25,
            cycles_completed: 0,
        }
    }

    fn live(date: NaiveDate, focus_minutes_today: u32) -> DailyStats {
        DailyStats {
            focus_minutes_today,
            ..DailyStats::new(date)
        }
    }

    fn entry(phase: Phase, minutes: u32) -> SessionLogEntry {
        let at = DateTime::<Utc>::from_timestamp(1_704_099_600, 0).unwrap();
        SessionLogEntry {
            id: format!("{phase:?}-{minutes}"),
            phase,
            minutes,
            started_at: at,
            ended_at: at,
            tag: None,
        }
    }

    #[test]
    fn test_daily_series_empty_history() {
        let today = date(1, 10);
        let series = daily_series(&[], &live(today, 50), today, 7);

        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, date(1, 4));
        assert_eq!(series[6].date, today);
        assert_eq!(series[6].focus_minutes, 50);
        assert!(series[..6].iter().all(|p| p.focus_minutes == 0));
    }

    #[test]
    fn test_daily_series_fills_gaps() {
        let today = date(1, 10);
        let history = [record(date(1, 5), 100), record(date(1, 8), 25)];
        let series = daily_series(&history, &live(today, 0), today, 7);

        let minutes: Vec<u32> = series.iter().map(|p| p.focus_minutes).collect();
        assert_eq!(minutes, vec![0, 100, 0, 0, 25, 0, 0]);
    }

    #[test]
    fn test_daily_series_drops_days_outside_window() {
        let today = date(2, 1);
        let history = [record(date(1, 1), 300)];
        let series = daily_series(&history, &live(today, 0), today, 3);
        assert!(series.iter().all(|p| p.focus_minutes == 0));
    }

    #[test]
    fn test_daily_series_keeps_live_day_under_clock_skew() {
        let series = daily_series(&[], &live(date(1, 10), 40), date(1, 9), 3);
        assert_eq!(series.last().unwrap().date, date(1, 10));
        assert_eq!(series.last().unwrap().focus_minutes, 40);
    }

    #[test]
    fn test_focus_by_day_saturates() {
        let today = date(1, 10);
        let history = [record(today, u32::MAX)];
        let series = daily_series(&history, &live(today, 25), today, 1);
        assert_eq!(series[0].focus_minutes, u32::MAX);
    }

    #[test]
    fn test_daily_series_zero_days() {
        let today = date(1, 10);
        assert!(daily_series(&[], &live(today, 10), today, 0).is_empty());
    }

    #[test]
    fn test_phase_distribution_all_sessions() {
        let entries = [
            entry(Phase::Focus, 25),
            entry(Phase::ShortBreak, 5),
            entry(Phase::Focus, 25),
            entry(Phase::LongBreak, 15),
        ];
        let totals = phase_distribution(&entries, None);
        assert_eq!(totals.focus, 50);
        assert_eq!(totals.short_break, 5);
        assert_eq!(totals.long_break, 15);
    }

    #[test]
    fn test_phase_distribution_window() {
        let entries = [
            entry(Phase::ShortBreak, 5),
            entry(Phase::Focus, 25),
            entry(Phase::LongBreak, 15),
        ];
        let totals = phase_distribution(&entries, Some(2));
        assert_eq!(totals.focus, 25);
        assert_eq!(totals.short_break, 5);
        assert_eq!(totals.long_break, 0);
    }

    #[test]
    fn test_phase_distribution_empty() {
        assert_eq!(phase_distribution(&[], None), PhaseTotals::default());
    }

    #[test]
    fn test_current_streak_includes_today() {
        let today = date(1, 10);
        let history = [
            record(date(1, 7), 25),
            record(date(1, 8), 50),
            record(date(1, 9), 25),
        ];
        assert_eq!(current_streak(&history, &live(today, 25), today), 4);
    }

    #[test]
    fn test_current_streak_counts_from_yesterday() {
        let today = date(1, 10);
        let history = [record(date(1, 8), 50), record(date(1, 9), 25)];
        assert_eq!(current_streak(&history, &live(today, 0), today), 2);
    }

    #[test]
    fn test_current_streak_broken() {
        let today = date(1, 10);
        let history = [record(date(1, 7), 50), record(date(1, 8), 0)];
        assert_eq!(current_streak(&history, &live(today, 0), today), 0);
    }

    #[test]
    fn test_longest_streak() {
        let history = [
            record(date(1, 1), 25),
            record(date(1, 2), 25),
            record(date(1, 3), 25),
            record(date(1, 5), 25),
            record(date(1, 6), 0),
            record(date(1, 7), 25),
        ];
        assert_eq!(longest_streak(&history, &live(date(1, 8), 25)), 3);
        assert_eq!(longest_streak(&[], &live(date(1, 8), 0)), 0);
    }

    #[test]
    fn test_goal_progress() {
        assert_eq!(goal_progress(0, 240), 0.0);
        assert_eq!(goal_progress(120, 240), 0.5);
        assert_eq!(goal_progress(500, 240), 1.0);
    }

    #[test]
    fn test_cycle_progress() {
        assert_eq!(cycle_progress(1, 4), 0.0);
        assert_eq!(cycle_progress(3, 4), 0.5);
        assert_eq!(cycle_progress(4, 4), 0.75);
    }
}
