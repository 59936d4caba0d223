//! Sound player implementation using rodio.
//!
//! The rodio output stream cannot leave the thread that opened it, so the
//! player owns a dedicated audio thread and hands it file paths over a
//! channel. `play` never blocks on decoding or output.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, warn};

use super::error::SoundError;
use super::source::{validate_system_sound_path, SoundSource};
use super::SoundPlayer;

/// A sound player backed by rodio on a background thread.
pub struct RodioSoundPlayer {
    requests: Sender<PathBuf>,
}

impl RodioSoundPlayer {
    /// Opens the default output device.
    ///
    /// # Errors
    ///
    /// Returns `SoundError::DeviceNotAvailable` if no audio output device
    /// is available.
    pub fn new() -> Result<Self, SoundError> {
        let (requests, queue) = unbounded::<PathBuf>();
        let (ready_tx, ready_rx) = bounded::<Result<(), SoundError>>(1);

        thread::Builder::new()
            .name("flyt-audio".to_string())
            .spawn(move || audio_thread(&queue, &ready_tx))
            .map_err(|e| SoundError::StreamError(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| SoundError::DeviceNotAvailable("audio thread exited".to_string()))??;
        debug!("Audio output stream initialized");

        Ok(Self { requests })
    }
}

fn audio_thread(queue: &Receiver<PathBuf>, ready: &Sender<Result<(), SoundError>>) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(SoundError::DeviceNotAvailable(e.to_string())));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    // Ends when the player is dropped.
    for path in queue {
        if let Err(e) = play_file(&handle, &path) {
            warn!(path = %path.display(), error = %e, "Sound playback failed");
        }
    }
    debug!("Audio thread stopped");
}

fn play_file(handle: &OutputStreamHandle, path: &Path) -> Result<(), SoundError> {
    let file = File::open(path)
        .map_err(|e| SoundError::FileNotFound(format!("{}: {}", path.display(), e)))?;
    let decoder =
        Decoder::new(BufReader::new(file)).map_err(|e| SoundError::DecodeError(e.to_string()))?;
    let sink = Sink::try_new(handle).map_err(|e| SoundError::StreamError(e.to_string()))?;
    sink.append(decoder);
    sink.detach();
    Ok(())
}

impl SoundPlayer for RodioSoundPlayer {
    fn play(&self, source: &SoundSource) -> Result<(), SoundError> {
        validate_system_sound_path(source.path())?;
        if !source.path().exists() {
            return Err(SoundError::FileNotFound(source.path().display().to_string()));
        }
        debug!(sound = source.name(), "Playing sound");
        self.requests
            .send(source.path().to_path_buf())
            .map_err(|_| SoundError::PlaybackError("audio thread stopped".to_string()))
    }
}

impl std::fmt::Debug for RodioSoundPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioSoundPlayer").finish_non_exhaustive()
    }
}

/// Creates a player, or `None` with a warning when there is no audio device.
#[must_use]
pub fn try_create_player() -> Option<Arc<dyn SoundPlayer>> {
    match RodioSoundPlayer::new() {
        Ok(player) => Some(Arc::new(player)),
        Err(e) => {
            warn!(error = %e, hint = e.suggestion(), "Audio not available, sound disabled");
            None
        }
    }
}
