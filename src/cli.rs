//! Command line interface and one-shot command handling.

use crate::app::{AppError, Engine};
use crate::metrics::DayPoint;
use crate::models::{CountDirection, PhaseTotals, Settings, SettingsError};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Width of the bars in `stats`.
const BAR_WIDTH: usize = 30;

#[derive(Parser, Debug)]
#[command(name = "pomotally", version, about = "Pomodoro focus timer with local statistics")]
pub struct Cli {
    /// Path to the database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Log level requested on the command line, if any.
    pub fn log_level(&self) -> Option<LevelFilter> {
        self.verbose.then_some(LevelFilter::DEBUG)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the timer in the foreground
    Run,
    /// Start the timer and run it in the foreground
    Start {
        /// Tag for the next recorded session
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show the timer and today's progress
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Pause the timer
    Pause,
    /// Skip to the next phase without recording
    Skip,
    /// Restart the current phase
    Reset,
    /// Focus history and phase distribution
    Stats {
        /// Number of days to chart
        #[arg(long, default_value_t = 7)]
        days: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Write a JSON snapshot to FILE or stdout
    Export { file: Option<PathBuf> },
    /// Replace all data with a JSON snapshot
    Import { file: PathBuf },
    /// Session log
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
    /// Todo list
    Todo {
        #[command(subcommand)]
        action: TodoAction,
    },
    /// Saved formulas
    Formula {
        #[command(subcommand)]
        action: FormulaAction,
    },
    /// Saved feed sources
    Feed {
        #[command(subcommand)]
        action: FeedAction,
    },
    /// Record the current timer display as a lap
    Lap,
    /// Clear statistics, history and the session log
    ResetStats,
    /// Return everything to defaults
    ResetAll,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    Show,
    /// Set one setting, e.g. `focus_mins 50` or `history_retention_days none`
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
pub enum LogAction {
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum TodoAction {
    Add {
        title: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    Done { id: String },
    Undo { id: String },
    Rm { id: String },
    List,
}

#[derive(Subcommand, Debug)]
pub enum FormulaAction {
    Add { title: String, body: String },
    Rm { id: String },
    List,
}

#[derive(Subcommand, Debug)]
pub enum FeedAction {
    Add { url: String },
    Rm { url: String },
    List,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Unknown setting `{0}`")]
    UnknownSetting(String),
    #[error("Invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },
    #[error("No {kind} with id {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Nothing to add: {0}")]
    Rejected(&'static str),
    #[error("This command runs in the foreground loop")]
    Foreground,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Machine readable output of `stats --json`.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub daily_series: Vec<DayPoint>,
    pub phase_distribution: PhaseTotals,
    pub lifetime_totals: PhaseTotals,
    pub current_streak: u32,
    pub longest_streak: u32,
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_limit(key: &str, value: &str) -> Result<Option<usize>, CliError> {
    match value {
        "none" | "off" | "all" => Ok(None),
        value => parse(key, value).map(Some),
    }
}

/// Applies `key = value` to a settings copy. Validation is left to the engine.
pub fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<(), CliError> {
    match key {
        "focus_mins" => settings.focus_mins = parse(key, value)?,
        "short_break_mins" => settings.short_break_mins = parse(key, value)?,
        "long_break_mins" => settings.long_break_mins = parse(key, value)?,
        "long_break_every" => settings.long_break_every = parse(key, value)?,
        "total_cycles" => settings.total_cycles = parse(key, value)?,
        "auto_start" => settings.auto_start = parse(key, value)?,
        "daily_goal_mins" => settings.daily_goal_mins = parse(key, value)?,
        "count_direction" => {
            settings.count_direction = match value {
                "up" => CountDirection::Up,
                "down" => CountDirection::Down,
                _ => {
                    return Err(CliError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
                }
            }
        }
        "precision_ms" => settings.precision_ms = parse(key, value)?,
        "sound_enabled" => settings.sound_enabled = parse(key, value)?,
        "notifications_enabled" => settings.notifications_enabled = parse(key, value)?,
        "distribution_window" => settings.distribution_window = parse_limit(key, value)?,
        "history_retention_days" => settings.history_retention_days = parse_limit(key, value)?,
        _ => return Err(CliError::UnknownSetting(key.to_string())),
    }
    Ok(())
}

fn percent(fraction: f64) -> u32 {
    (fraction * 100.0).round() as u32
}

fn bar(minutes: u32, max: u32) -> String {
    if max == 0 {
        return String::new();
    }
    let width = (minutes as usize * BAR_WIDTH).div_ceil(max as usize);
    "█".repeat(width)
}

/// Runs a one-shot command against the engine, writing output to `out`.
pub fn run_command(engine: &mut Engine, command: Command, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Run | Command::Start { .. } => return Err(CliError::Foreground),
        Command::Status { json } => {
            let dashboard = engine.dashboard();
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&dashboard)?)?;
            } else {
                writeln!(out, "{}", engine.title())?;
                writeln!(out, "Progress: {}%", percent(dashboard.progress))?;
                writeln!(
                    out,
                    "Today: {} / {} min ({}%), {} pomodoros",
                    dashboard.focus_minutes_today,
                    dashboard.daily_goal_mins,
                    percent(dashboard.goal_progress),
                    dashboard.pomodoros_today
                )?;
                writeln!(out, "Cycle: {} / {}", dashboard.current_cycle, dashboard.total_cycles)?;
                writeln!(
                    out,
                    "Streak: {} days (longest {})",
                    dashboard.current_streak, dashboard.longest_streak
                )?;
            }
        }
        Command::Pause => {
            if engine.timer().is_running() {
                engine.pause();
            }
            writeln!(out, "{}", engine.title())?;
        }
        Command::Skip => {
            let next = engine.skip();
            writeln!(out, "Skipped to {}", next.label())?;
        }
        Command::Reset => {
            engine.reset();
            writeln!(out, "{}", engine.title())?;
        }
        Command::Stats { days, json } => {
            let dashboard = engine.dashboard();
            let report = StatsReport {
                daily_series: engine.daily_series(days),
                phase_distribution: dashboard.phase_distribution,
                lifetime_totals: engine.lifetime_totals(),
                current_streak: dashboard.current_streak,
                longest_streak: dashboard.longest_streak,
            };
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                write_stats(&report, out)?;
            }
        }
        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let value = serde_json::to_value(engine.settings())?;
                if let Some(fields) = value.as_object() {
                    for (key, value) in fields {
                        writeln!(out, "{key} = {value}")?;
                    }
                }
            }
            SettingsAction::Set { key, value } => {
                let mut settings = engine.settings().clone();
                apply_setting(&mut settings, &key, &value)?;
                engine.update_settings(settings)?;
                writeln!(out, "{key} = {value}")?;
            }
        },
        Command::Export { file } => {
            let json = engine.export_json()?;
            match file {
                Some(path) => fs::write(path, json)?,
                None => writeln!(out, "{json}")?,
            }
        }
        Command::Import { file } => {
            let json = fs::read_to_string(file)?;
            engine.import_json(&json)?;
            writeln!(out, "Imported {} sessions", engine.session_log().len())?;
        }
        Command::Log { action } => match action {
            LogAction::List { limit } => {
                for entry in engine.session_log().iter().take(limit) {
                    writeln!(
                        out,
                        "{}  {:<11}  {:>3} min  {}  {}",
                        entry.id,
                        entry.phase.label(),
                        entry.minutes,
                        entry.ended_at.format("%Y-%m-%d %H:%M"),
                        entry.tag.as_deref().unwrap_or("")
                    )?;
                }
            }
            LogAction::Delete { id } => {
                if engine.delete_session(&id).is_none() {
                    return Err(CliError::NotFound { kind: "session", id });
                }
                writeln!(out, "Deleted {id}")?;
            }
        },
        Command::Todo { action } => run_todo(engine, action, out)?,
        Command::Formula { action } => run_formula(engine, action, out)?,
        Command::Feed { action } => run_feed(engine, action, out)?,
        Command::Lap => {
            let lap = engine.lap();
            writeln!(out, "Lap {} at {}", lap.display, lap.phase.label())?;
        }
        Command::ResetStats => {
            engine.reset_stats();
            writeln!(out, "Statistics cleared")?;
        }
        Command::ResetAll => {
            engine.reset_all();
            writeln!(out, "All data reset")?;
        }
    }
    Ok(())
}

fn write_stats(report: &StatsReport, out: &mut dyn Write) -> Result<(), CliError> {
    let max = report
        .daily_series
        .iter()
        .map(|point| point.focus_minutes)
        .max()
        .unwrap_or(0);
    for point in &report.daily_series {
        writeln!(
            out,
            "{}  {:>4} min  {}",
            point.date,
            point.focus_minutes,
            bar(point.focus_minutes, max)
        )?;
    }

    writeln!(out)?;
    for (phase, fraction) in report.phase_distribution.fractions() {
        writeln!(
            out,
            "{:<11}  {:>5} min  {:>3}%",
            phase.label(),
            report.phase_distribution.get(phase),
            percent(fraction)
        )?;
    }
    writeln!(
        out,
        "\nStreak: {} days (longest {})",
        report.current_streak, report.longest_streak
    )?;
    Ok(())
}

fn run_todo(engine: &mut Engine, action: TodoAction, out: &mut dyn Write) -> Result<(), CliError> {
    match action {
        TodoAction::Add { title, note } => {
            let id = engine
                .edit_notes(|notes| notes.add_todo(&title, &note).map(|todo| todo.id.clone()))
                .ok_or(CliError::Rejected("todo title is empty"))?;
            writeln!(out, "Added {id}")?;
        }
        TodoAction::Done { id } => set_todo_done(engine, id, true, out)?,
        TodoAction::Undo { id } => set_todo_done(engine, id, false, out)?,
        TodoAction::Rm { id } => {
            if engine.edit_notes(|notes| notes.remove_todo(&id)).is_none() {
                return Err(CliError::NotFound { kind: "todo", id });
            }
            writeln!(out, "Removed {id}")?;
        }
        TodoAction::List => {
            for todo in &engine.notes().todos {
                let mark = if todo.done { "x" } else { " " };
                writeln!(out, "[{mark}] {}  {}", todo.id, todo.title)?;
                if !todo.note.is_empty() {
                    writeln!(out, "      {}", todo.note)?;
                }
            }
        }
    }
    Ok(())
}

fn set_todo_done(engine: &mut Engine, id: String, done: bool, out: &mut dyn Write) -> Result<(), CliError> {
    if !engine.edit_notes(|notes| notes.set_todo_done(&id, done)) {
        return Err(CliError::NotFound { kind: "todo", id });
    }
    writeln!(out, "Updated {id}")?;
    Ok(())
}

fn run_formula(engine: &mut Engine, action: FormulaAction, out: &mut dyn Write) -> Result<(), CliError> {
    match action {
        FormulaAction::Add { title, body } => {
            let id = engine
                .edit_notes(|notes| notes.add_formula(&title, &body).map(|formula| formula.id.clone()))
                .ok_or(CliError::Rejected("formula needs a title and a body"))?;
            writeln!(out, "Added {id}")?;
        }
        FormulaAction::Rm { id } => {
            if engine.edit_notes(|notes| notes.remove_formula(&id)).is_none() {
                return Err(CliError::NotFound { kind: "formula", id });
            }
            writeln!(out, "Removed {id}")?;
        }
        FormulaAction::List => {
            for formula in &engine.notes().formulas {
                writeln!(out, "{}  {}: {}", formula.id, formula.title, formula.body)?;
            }
        }
    }
    Ok(())
}

fn run_feed(engine: &mut Engine, action: FeedAction, out: &mut dyn Write) -> Result<(), CliError> {
    match action {
        FeedAction::Add { url } => {
            if !engine.edit_notes(|notes| notes.add_feed(&url)) {
                return Err(CliError::Rejected("feed is empty or already saved"));
            }
            writeln!(out, "Saved {}", url.trim())?;
        }
        FeedAction::Rm { url } => {
            if !engine.edit_notes(|notes| notes.remove_feed(&url)) {
                return Err(CliError::NotFound { kind: "feed", id: url });
            }
            writeln!(out, "Removed {url}")?;
        }
        FeedAction::List => {
            for feed in &engine.notes().feeds {
                writeln!(out, "{feed}")?;
            }
        }
    }
    Ok(())
}
