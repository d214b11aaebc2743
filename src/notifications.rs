//! Desktop notifications for phase completions.

use crate::app::CompletionEvent;
use crate::models::Phase;
use notify_rust::Notification;
use std::thread;
use tracing::warn;

/// Summary and body for a completion event.
///
/// `long_break_mins` is only used when a long break follows.
pub fn message_for(event: CompletionEvent, long_break_mins: u32) -> (String, String) {
    match event {
        CompletionEvent::FocusComplete {
            next: Phase::LongBreak,
            ..
        } => (
            "Long Break Time! 🎉".to_string(),
            format!("You've earned a {long_break_mins} minute break. Great job staying focused!"),
        ),
        CompletionEvent::FocusComplete { count_today, .. } => {
            let body = if count_today == 1 {
                "Great work! You've completed 1 pomodoro today.\nTime for a break.".to_string()
            } else {
                format!("Great work! You've completed {count_today} pomodoros today.\nTime for a break.")
            };
            ("Pomodoro Complete! 🍅".to_string(), body)
        }
        CompletionEvent::BreakComplete {
            cycle_completed: true,
            ..
        } => (
            "Cycle Complete! 🏁".to_string(),
            "Long break is over. Ready for the next cycle?".to_string(),
        ),
        CompletionEvent::BreakComplete { .. } => (
            "Break Over! ☕".to_string(),
            "Ready to start another pomodoro?".to_string(),
        ),
    }
}

/// Shows the notification for a completion event.
/// Runs in a background thread to avoid blocking.
pub fn notify_completion(event: CompletionEvent, long_break_mins: u32) {
    let (summary, body) = message_for(event, long_break_mins);
    thread::spawn(move || {
        if let Err(e) = Notification::new()
            .summary(&summary)
            .body(&body)
            .sound_name("default")
            .show()
        {
            warn!("failed to show notification: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_message_singular_and_plural() {
        let (summary, body) = message_for(
            CompletionEvent::FocusComplete {
                count_today: 1,
                next: Phase::ShortBreak,
            },
            15,
        );
        assert_eq!(summary, "Pomodoro Complete! 🍅");
        assert!(body.contains("1 pomodoro today"));

        let (_, body) = message_for(
            CompletionEvent::FocusComplete {
                count_today: 3,
                next: Phase::ShortBreak,
            },
            15,
        );
        assert!(body.contains("3 pomodoros today"));
    }

    #[test]
    fn test_long_break_message() {
        let (summary, body) = message_for(
            CompletionEvent::FocusComplete {
                count_today: 4,
                next: Phase::LongBreak,
            },
            20,
        );
        assert_eq!(summary, "Long Break Time! 🎉");
        assert!(body.contains("20 minute break"));
    }

    #[test]
    fn test_break_messages() {
        let (summary, _) = message_for(
            CompletionEvent::BreakComplete {
                phase: Phase::ShortBreak,
                cycle_completed: false,
            },
            15,
        );
        assert_eq!(summary, "Break Over! ☕");

        let (summary, _) = message_for(
            CompletionEvent::BreakComplete {
                phase: Phase::LongBreak,
                cycle_completed: true,
            },
            15,
        );
        assert_eq!(summary, "Cycle Complete! 🏁");
    }

    // Interacts with the system notification daemon.
    #[test]
    #[ignore = "Requires system notification interaction"]
    fn test_show_notification() {
        notify_completion(
            CompletionEvent::BreakComplete {
                phase: Phase::ShortBreak,
                cycle_completed: false,
            },
            15,
        );
    }
}
