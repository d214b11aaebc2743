//! SQLite persistence for engine state, and the JSON snapshot format used
//! for export and import.

use crate::models::{
    DailyStats, HistoryRecord, Phase, PhaseTotals, SessionLogEntry, Settings, SettingsError,
};
use crate::notes::Notes;
use crate::timer::TimerCheckpoint;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version written into every snapshot.
pub const STATE_VERSION: u32 = 1;

/// Top-level fields an imported snapshot must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["settings", "timer", "session_log", "daily", "history"];

const KEY_VERSION: &str = "version";
const KEY_SETTINGS: &str = "settings";
const KEY_TIMER: &str = "timer";
const KEY_DAILY: &str = "daily";
const KEY_LIFETIME: &str = "lifetime_totals";
const KEY_NOTES: &str = "notes";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("Unknown phase in storage: {0}")]
    UnknownPhase(String),
    #[error("Stored state is missing {0}")]
    Missing(&'static str),
    #[error("Failed to create database directory")]
    DirectoryCreation,
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Snapshot is not a JSON object")]
    NotAnObject,
    #[error("Snapshot is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Snapshot carries invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),
}

/// Serializable snapshot of everything the engine keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default = "current_version")]
    pub version: u32,
    pub settings: Settings,
    pub timer: TimerCheckpoint,
    /// Newest first.
    pub session_log: Vec<SessionLogEntry>,
    #[serde(default)]
    pub lifetime_totals: PhaseTotals,
    pub daily: DailyStats,
    pub history: Vec<HistoryRecord>,
    #[serde(default)]
    pub notes: Notes,
}

fn current_version() -> u32 {
    STATE_VERSION
}

impl PersistedState {
    /// Pretty JSON for export.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses and validates an imported snapshot.
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or(ImportError::NotAnObject)?;
        if let Some(field) = REQUIRED_FIELDS.iter().find(|field| !object.contains_key(**field)) {
            return Err(ImportError::MissingField(*field));
        }
        let state: PersistedState = serde_json::from_value(value)?;
        state.settings.validate()?;
        Ok(state)
    }
}

/// Durable storage for engine state.
pub trait StateStore: Send {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<PersistedState>, DatabaseError>;

    fn save(&mut self, state: &PersistedState) -> Result<(), DatabaseError>;
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens the database at the default location.
    pub fn new() -> Result<Self, DatabaseError> {
        Self::open(&Self::db_path())
    }

    /// Opens or creates the database at `path`, initializing tables if needed.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|_| DatabaseError::DirectoryCreation)?;
        }

        let conn = Connection::open(path)?;
        Self::initialize_tables(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_tables(&conn)?;
        Ok(Self { conn })
    }

    fn initialize_tables(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_log (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL,
                phase TEXT NOT NULL,
                minutes INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                tag TEXT
            );

            CREATE TABLE IF NOT EXISTS history (
                seq INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                focus_minutes INTEGER NOT NULL DEFAULT 0,
                pomodoros INTEGER NOT NULL DEFAULT 0,
                cycles_completed INTEGER NOT NULL DEFAULT 0
            );
        "#,
        )?;
        Ok(())
    }

    /// Default database location in the platform data directory.
    pub fn db_path() -> PathBuf {
        ProjectDirs::from("com", "pomotally", "Pomotally")
            .map(|dirs| dirs.data_dir().join("pomotally.db"))
            .unwrap_or_else(|| PathBuf::from("pomotally.db"))
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DatabaseError> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| row.get(0))
            .optional()?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    fn load_session_log(&self) -> Result<Vec<SessionLogEntry>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phase, minutes, started_at, ended_at, tag
             FROM session_log ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, phase, minutes, started_at, ended_at, tag) = row?;
            entries.push(SessionLogEntry {
                id,
                phase: Phase::from_key(&phase).ok_or(DatabaseError::UnknownPhase(phase))?,
                minutes,
                started_at: parse_timestamp(&started_at)?,
                ended_at: parse_timestamp(&ended_at)?,
                tag,
            });
        }
        Ok(entries)
    }

    fn load_history(&self) -> Result<Vec<HistoryRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, focus_minutes, pomodoros, cycles_completed
             FROM history ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (date, focus_minutes, pomodoros, cycles_completed) = row?;
            history.push(HistoryRecord {
                date_key: date.parse::<NaiveDate>()?,
                focus_minutes,
                pomodoros,
                cycles_completed,
            });
        }
        Ok(history)
    }
}

impl StateStore for Database {
    fn load(&self) -> Result<Option<PersistedState>, DatabaseError> {
        let Some(settings) = self.get_json::<Settings>(KEY_SETTINGS)? else {
            return Ok(None);
        };

        Ok(Some(PersistedState {
            version: self.get_json(KEY_VERSION)?.unwrap_or(STATE_VERSION),
            settings,
            timer: self.get_json(KEY_TIMER)?.ok_or(DatabaseError::Missing(KEY_TIMER))?,
            session_log: self.load_session_log()?,
            lifetime_totals: self.get_json(KEY_LIFETIME)?.unwrap_or_default(),
            daily: self.get_json(KEY_DAILY)?.ok_or(DatabaseError::Missing(KEY_DAILY))?,
            history: self.load_history()?,
            notes: self.get_json(KEY_NOTES)?.unwrap_or_default(),
        }))
    }

    /// Replaces the stored state in a single transaction.
    fn save(&mut self, state: &PersistedState) -> Result<(), DatabaseError> {
        let documents = [
            (KEY_VERSION, serde_json::to_string(&state.version)?),
            (KEY_SETTINGS, serde_json::to_string(&state.settings)?),
            (KEY_TIMER, serde_json::to_string(&state.timer)?),
            (KEY_DAILY, serde_json::to_string(&state.daily)?),
            (KEY_LIFETIME, serde_json::to_string(&state.lifetime_totals)?),
            (KEY_NOTES, serde_json::to_string(&state.notes)?),
        ];

        let tx = self.conn.transaction()?;
        for (key, json) in &documents {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
                params![key, json],
            )?;
        }

        tx.execute("DELETE FROM session_log", [])?;
        for (seq, entry) in state.session_log.iter().enumerate() {
            tx.execute(
                "INSERT INTO session_log (seq, id, phase, minutes, started_at, ended_at, tag)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    seq as i64,
                    entry.id,
                    entry.phase.key(),
                    entry.minutes,
                    format_timestamp(&entry.started_at),
                    format_timestamp(&entry.ended_at),
                    entry.tag,
                ],
            )?;
        }

        tx.execute("DELETE FROM history", [])?;
        for (seq, record) in state.history.iter().enumerate() {
            tx.execute(
                "INSERT INTO history (seq, date, focus_minutes, pomodoros, cycles_completed)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    seq as i64,
                    record.date_key.to_string(),
                    record.focus_minutes,
                    record.pomodoros,
                    record.cycles_completed,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
