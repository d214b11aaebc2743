//! Todos, formulas, saved feed sources and laps kept next to the timer.

use crate::models::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// A bookmark of the timer display at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lap {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub phase: Phase,
    pub display: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notes {
    /// Newest first.
    pub todos: Vec<Todo>,
    /// Newest first.
    pub formulas: Vec<Formula>,
    /// Saved feed URLs.
    pub feeds: Vec<String>,
    /// Oldest first.
    pub laps: Vec<Lap>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Notes {
    /// Adds a todo on top of the list. Blank titles are ignored.
    pub fn add_todo(&mut self, title: &str, note: &str) -> Option<&Todo> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        self.todos.insert(
            0,
            Todo {
                id: new_id(),
                title: title.to_string(),
                note: note.trim().to_string(),
                done: false,
            },
        );
        self.todos.first()
    }

    /// Marks a todo done or not done. Returns false for an unknown id.
    pub fn set_todo_done(&mut self, id: &str, done: bool) -> bool {
        match self.todos.iter_mut().find(|todo| todo.id == id) {
            Some(todo) => {
                todo.done = done;
                true
            }
            None => false,
        }
    }

    pub fn remove_todo(&mut self, id: &str) -> Option<Todo> {
        let index = self.todos.iter().position(|todo| todo.id == id)?;
        Some(self.todos.remove(index))
    }

    /// Adds a formula on top of the list. Both fields are required.
    pub fn add_formula(&mut self, title: &str, body: &str) -> Option<&Formula> {
        let (title, body) = (title.trim(), body.trim());
        if title.is_empty() || body.is_empty() {
            return None;
        }
        self.formulas.insert(
            0,
            Formula {
                id: new_id(),
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        self.formulas.first()
    }

    pub fn remove_formula(&mut self, id: &str) -> Option<Formula> {
        let index = self.formulas.iter().position(|formula| formula.id == id)?;
        Some(self.formulas.remove(index))
    }

    /// Saves a feed URL. Returns false if blank or already saved.
    pub fn add_feed(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.feeds.iter().any(|feed| feed == url) {
            return false;
        }
        self.feeds.push(url.to_string());
        true
    }

    pub fn remove_feed(&mut self, url: &str) -> bool {
        let before = self.feeds.len();
        self.feeds.retain(|feed| feed != url.trim());
        self.feeds.len() != before
    }

    pub fn add_lap(&mut self, recorded_at: DateTime<Utc>, phase: Phase, display: String) -> &Lap {
        self.laps.push(Lap {
            id: new_id(),
            recorded_at,
            phase,
            display,
        });
        &self.laps[self.laps.len() - 1]
    }
}
