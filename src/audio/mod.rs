pub mod beep;

use anyhow::{anyhow, Result};
use beep::Beep;
use log::info;
use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Mutex, PoisonError,
};
use std::thread;

use crate::alert::Notifier;

enum AudioCommand {
    Beep { reply: mpsc::Sender<Result<(), String>> },
}

/// Owns the (non-`Send`) rodio output stream on a dedicated thread that is
/// started on first use.
pub struct AudioEngineHandle {
    tx: Mutex<Option<Sender<AudioCommand>>>,
}

impl Default for AudioEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngineHandle {
    pub fn new() -> Self {
        Self { tx: Mutex::new(None) }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Beep { reply } => {
                            let result = ensure_sink(&mut _stream, &mut sink).map(|()| {
                                if let Some(ref s) = sink {
                                    // Beeps queued behind a still-playing one are dropped.
                                    if s.empty() {
                                        s.append(Beep::alert());
                                    }
                                }
                            });
                            let _ = reply.send(result);
                        }
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn audio thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    /// Queues the alert tone. Fails when no output device is available.
    pub fn beep(&self) -> Result<()> {
        let tx = self.ensure_thread()?;
        let (reply, rx) = mpsc::channel();
        tx.send(AudioCommand::Beep { reply })
            .map_err(|_| anyhow!("audio thread is gone"))?;
        rx.recv()
            .map_err(|_| anyhow!("audio thread is gone"))?
            .map_err(|e| anyhow!(e))
    }
}

/// Logs each alert message and, when enabled, plays the alert tone.
pub struct SoundNotifier {
    audio: AudioEngineHandle,
    sound: bool,
}

impl SoundNotifier {
    pub fn new(sound: bool) -> Self {
        Self {
            audio: AudioEngineHandle::new(),
            sound,
        }
    }
}

impl Notifier for SoundNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        info!("{message}");
        if self.sound {
            self.audio.beep()?;
        }
        Ok(())
    }
}
