// Scan feedback: a short beep and a vibration request.

use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rodio::source::{SineWave, Source};
use rodio::{OutputStream, Sink};

const BEEP_FREQUENCY_HZ: f32 = 1760.0;
const BEEP_LENGTH: Duration = Duration::from_millis(150);

pub trait Feedback {
    /// Whether audible feedback is allowed at all (read once when the screen is created).
    fn sound_enabled(&self) -> bool;
    /// Get the beep ready. Calling it again once prepared does nothing.
    fn prepare(&mut self);
    fn play(&mut self, sound: bool, haptic: bool);
}

enum AudioCommand {
    Beep,
}

/// Beep through rodio on a dedicated audio thread (the output stream isn't Send).
pub struct BeepFeedback {
    muted: bool,
    volume: f32,
    vibrate: Duration,
    tx: Option<Sender<AudioCommand>>,
}

impl BeepFeedback {
    pub fn new(muted: bool, volume: f32, vibrate: Duration) -> Self {
        Self { muted, volume, vibrate, tx: None }
    }

    fn spawn_audio_thread(volume: f32) -> Result<Sender<AudioCommand>, String> {
        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("audio-feedback".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to create audio output stream: {e}")));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to create audio sink: {e}")));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Beep => {
                            // Rewind: anything still queued is dropped so beeps never stack.
                            sink.clear();
                            sink.append(
                                SineWave::new(BEEP_FREQUENCY_HZ)
                                    .take_duration(BEEP_LENGTH)
                                    .amplify(volume),
                            );
                            sink.play();
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        ready_rx
            .recv()
            .map_err(|_| "audio thread exited before starting".to_string())??;
        Ok(tx)
    }
}

impl Feedback for BeepFeedback {
    fn sound_enabled(&self) -> bool {
        !self.muted
    }

    fn prepare(&mut self) {
        if self.muted || self.tx.is_some() {
            return;
        }
        match Self::spawn_audio_thread(self.volume) {
            Ok(tx) => {
                debug!("beep prepared");
                self.tx = Some(tx);
            }
            // Same as a missing beep resource: scanning goes on silently.
            Err(e) => warn!("beep unavailable: {e}"),
        }
    }

    fn play(&mut self, sound: bool, haptic: bool) {
        if sound {
            if let Some(tx) = &self.tx {
                if tx.send(AudioCommand::Beep).is_err() {
                    warn!("audio thread is gone, dropping beep");
                    self.tx = None;
                }
            }
        }
        if haptic {
            // Desktop hosts have no vibrator; the request is recorded in the log.
            info!("vibrate {}ms", self.vibrate.as_millis());
        }
    }
}
