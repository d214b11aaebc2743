//! Background tick loop driving the engine.

use crate::app::{CompletionEvent, Engine};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Message sent from the tick thread to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum TickMessage {
    /// Timer state has changed, UI needs update.
    StateChanged { title: String },
    /// A phase completed, trigger notification/sound.
    Completed(CompletionEvent),
}

/// Handle to a running tick thread.
pub struct RunnerHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl RunnerHandle {
    /// Stops the loop and waits for the thread to exit. No tick runs after
    /// this returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("tick thread panicked");
            }
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns the tick thread. It ticks every `precision_ms` of the current
/// settings and sends messages over `tx`.
pub fn spawn(engine: Arc<Mutex<Engine>>, tx: Sender<TickMessage>) -> RunnerHandle {
    let (stop_tx, stop_rx) = mpsc::channel();
    let thread = thread::spawn(move || run_tick_loop(engine, tx, stop_rx));
    RunnerHandle {
        stop_tx,
        thread: Some(thread),
    }
}

fn run_tick_loop(engine: Arc<Mutex<Engine>>, tx: Sender<TickMessage>, stop_rx: mpsc::Receiver<()>) {
    debug!("tick loop started");
    loop {
        let interval = match engine.lock() {
            Ok(engine) => Duration::from_millis(engine.settings().precision_ms),
            Err(_) => break,
        };
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let messages = {
            let Ok(mut engine) = engine.lock() else {
                warn!("engine lock poisoned, stopping tick loop");
                break;
            };
            let (changed, completion) = engine.tick();

            let mut messages = Vec::with_capacity(2);
            if let Some(event) = completion {
                messages.push(TickMessage::Completed(event));
            }
            if changed {
                messages.push(TickMessage::StateChanged {
                    title: engine.title(),
                });
            }
            messages
        };

        for message in messages {
            if tx.send(message).is_err() {
                debug!("front end gone, stopping tick loop");
                return;
            }
        }
    }
    debug!("tick loop stopped");
}
