//! Pomotally - a Pomodoro focus timer for the terminal.
//!
//! One-shot commands operate on the stored state; `run` and `start` keep
//! the timer ticking in the foreground.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use clap::Parser;
use pomotally::app::{CompletionEvent, Engine};
#[cfg(feature = "audio")]
use pomotally::audio::AudioPlayer;
use pomotally::cli::{self, Cli, Command};
use pomotally::clock::SystemClock;
use pomotally::logging;
use pomotally::notifications;
use pomotally::persistence::Database;
use pomotally::runner::{self, TickMessage};
use tracing::{info, warn};

/// How often the foreground loop checks for keyboard input.
const INPUT_POLL: Duration = Duration::from_millis(50);

const HELP: &str = "keys: <enter>/p pause-resume, s skip, r reset, l lap, t TAG tag, q quit";

/// Foreground handler for the tick thread and keyboard input.
struct Foreground {
    engine: Arc<Mutex<Engine>>,
    #[cfg(feature = "audio")]
    audio: Option<AudioPlayer>,
}

enum Flow {
    Continue,
    Quit,
}

impl Foreground {
    fn new(engine: Arc<Mutex<Engine>>) -> Self {
        Self {
            engine,
            // Audio is created on the main thread; the output stream is not Send.
            #[cfg(feature = "audio")]
            audio: AudioPlayer::new()
                .map_err(|e| warn!("audio unavailable: {e}"))
                .ok(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Engine>, Box<dyn Error>> {
        self.engine.lock().map_err(|_| "engine lock poisoned".into())
    }

    fn show_title(&self, title: &str) {
        print!("\r{title}    ");
        let _ = io::stdout().flush();
    }

    #[cfg(feature = "audio")]
    fn chime(&self) {
        if let Some(ref audio) = self.audio {
            audio.play_chime();
        }
    }

    #[cfg(not(feature = "audio"))]
    fn chime(&self) {}

    fn handle_completion(&self, event: CompletionEvent) -> Result<(), Box<dyn Error>> {
        let engine = self.lock()?;
        let settings = engine.settings();

        if settings.sound_enabled {
            self.chime();
        }
        if settings.notifications_enabled {
            notifications::notify_completion(event, settings.long_break_mins);
        }

        let (summary, _) = notifications::message_for(event, settings.long_break_mins);
        println!("\r{summary}");
        self.show_title(&engine.title());
        Ok(())
    }

    fn handle_input(&self, line: &str) -> Result<Flow, Box<dyn Error>> {
        let mut engine = self.lock()?;
        let (command, argument) = line.split_once(' ').unwrap_or((line, ""));

        let completion = match command {
            "q" => return Ok(Flow::Quit),
            "" | "p" => engine.toggle(),
            "s" => {
                engine.skip();
                None
            }
            "r" => {
                engine.reset();
                None
            }
            "l" => {
                let lap = engine.lap();
                println!("\rlap {} ({})", lap.display, lap.phase.label());
                None
            }
            "t" => {
                engine.set_next_tag(Some(argument.to_string()));
                println!("\rnext session tagged {:?}", engine.next_tag().unwrap_or(""));
                None
            }
            _ => {
                println!("\r{HELP}");
                None
            }
        };

        let title = engine.title();
        drop(engine);
        if let Some(event) = completion {
            self.handle_completion(event)?;
        } else {
            self.show_title(&title);
        }
        Ok(Flow::Continue)
    }
}

/// Reads stdin lines on a separate thread. The channel closes on EOF.
fn spawn_input_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line.trim().to_string()).is_err() {
                break;
            }
        }
    });
    rx
}

fn run_foreground(engine: Engine, start: bool, tag: Option<String>) -> Result<(), Box<dyn Error>> {
    let engine = Arc::new(Mutex::new(engine));
    let foreground = Foreground::new(Arc::clone(&engine));

    {
        let mut engine = foreground.lock()?;
        if tag.is_some() {
            engine.set_next_tag(tag);
        }
        if start {
            engine.start();
        }
        println!("{HELP}");
        foreground.show_title(&engine.title());
    }

    let (tx, rx) = mpsc::channel();
    let runner = runner::spawn(Arc::clone(&engine), tx);
    let input = spawn_input_reader();
    info!("foreground loop started");

    loop {
        match rx.recv_timeout(INPUT_POLL) {
            Ok(TickMessage::StateChanged { title }) => foreground.show_title(&title),
            Ok(TickMessage::Completed(event)) => foreground.handle_completion(event)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        match input.try_recv() {
            Ok(line) => {
                if let Flow::Quit = foreground.handle_input(&line)? {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }
    }

    runner.stop();
    // Flush the time since the last tick into the saved checkpoint.
    let completion = foreground.lock()?.pause();
    if let Some(event) = completion {
        foreground.handle_completion(event)?;
    }
    println!();
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut engine = match cli.db {
        Some(ref path) => Engine::with_store(Box::new(Database::open(path)?), Box::new(SystemClock))?,
        None => Engine::new()?,
    };

    match cli.command {
        Command::Run => run_foreground(engine, false, None),
        Command::Start { tag } => run_foreground(engine, true, tag),
        command => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            cli::run_command(&mut engine, command, &mut out)?;
            if engine.is_dirty() {
                warn!("last change could not be saved");
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::enable_logging(cli.log_level());

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
