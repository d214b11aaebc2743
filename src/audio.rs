//! Completion chime, built with the `audio` feature.

use rodio::source::{SineWave, Source};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Pitch of the chime, A5.
const CHIME_HZ: f32 = 880.0;
const CHIME_MS: u64 = 220;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to initialize audio output: {0}")]
    Stream(#[from] rodio::StreamError),
    #[error("Failed to play audio: {0}")]
    Play(#[from] rodio::PlayError),
}

/// Owns the output stream; it must stay on the thread that created it.
pub struct AudioPlayer {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioPlayer {
    pub fn new() -> Result<Self, AudioError> {
        let (stream, handle) = OutputStream::try_default()?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    /// Plays the chime in the background. Failures are only logged.
    pub fn play_chime(&self) {
        if let Err(e) = self.play_tone() {
            warn!("failed to play chime: {e}");
        }
    }

    fn play_tone(&self) -> Result<(), AudioError> {
        let sink = Sink::try_new(&self.handle)?;
        let tone = SineWave::new(CHIME_HZ)
            .take_duration(Duration::from_millis(CHIME_MS))
            .fade_in(Duration::from_millis(10))
            .amplify(0.3);
        sink.append(tone);
        sink.detach();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_player_creation() {
        // Systems without an output device (CI) return an error instead.
        match AudioPlayer::new() {
            Ok(player) => player.play_chime(),
            Err(e) => println!("Audio player creation failed (expected on CI): {}", e),
        }
    }
}
