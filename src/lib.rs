//! Pomotally - a Pomodoro focus timer with local analytics.
//!
//! The [`app::Engine`] owns all state and is driven either directly or by
//! the background loop in [`runner`].

pub mod app;
#[cfg(feature = "audio")]
pub mod audio;
pub mod cli;
pub mod clock;
pub mod daily;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod notes;
pub mod notifications;
pub mod persistence;
pub mod runner;
pub mod session;
pub mod timer;
