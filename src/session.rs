//! Session log of completed phases.

use crate::models::{Phase, PhaseTotals, SessionLogEntry};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

/// Completed phases, newest first, plus lifetime minutes per phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLog {
    entries: Vec<SessionLogEntry>,
    lifetime: PhaseTotals,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(entries: Vec<SessionLogEntry>, lifetime: PhaseTotals) -> Self {
        Self { entries, lifetime }
    }

    /// Books a completed phase and returns the new entry.
    ///
    /// The duration is rounded to the nearest minute, at least one.
    pub fn record_completion(
        &mut self,
        phase: Phase,
        elapsed_secs: f64,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        tag: Option<String>,
    ) -> SessionLogEntry {
        let entry = SessionLogEntry {
            id: Uuid::new_v4().to_string(),
            phase,
            minutes: whole_minutes(elapsed_secs),
            started_at,
            ended_at,
            tag,
        };
        self.lifetime.add(phase, entry.minutes);
        self.entries.insert(0, entry.clone());
        info!(phase = %phase, minutes = entry.minutes, "session recorded");
        entry
    }

    /// Removes an entry by id. Lifetime totals keep the time.
    pub fn delete(&mut self, id: &str) -> Option<SessionLogEntry> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index))
    }

    /// All entries, newest first.
    pub fn entries(&self) -> &[SessionLogEntry] {
        &self.entries
    }

    /// The `n` most recent entries.
    pub fn recent(&self, n: usize) -> &[SessionLogEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn lifetime_totals(&self) -> PhaseTotals {
        self.lifetime
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lifetime = PhaseTotals::default();
    }
}

/// Seconds to whole minutes, rounded, minimum 1.
pub fn whole_minutes(secs: f64) -> u32 {
    ((secs.max(0.0) / 60.0).round() as u32).max(1)
}
