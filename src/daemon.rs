//! Daemon mode: background service with hotkey activation
//!
//! Startup order matters: the instance lock comes first so a second daemon
//! exits before touching the model or any device, and the whisper model is
//! loaded eagerly so a broken setup fails at startup instead of on the
//! first hotkey press. After that the daemon is a single select! loop over
//! hotkey events and shutdown signals.

use crate::config::Config;
use crate::error::Result;
use crate::hotkey::{self, HotkeyEvent};
use crate::lock::SingleInstanceGuard;
use crate::notify::{self, Urgency};
use crate::output;
use crate::session::{CaptureFactory, SessionCoordinator};
use crate::transcribe::{self, Transcriber};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// The voxd daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the daemon until a shutdown signal arrives.
    ///
    /// Acquires the single-instance lock, loads the model, starts the
    /// hotkey listener, then services triggers. The lock is released on
    /// every exit path (the guard's Drop covers panics).
    pub async fn run(self) -> Result<()> {
        let mut guard = SingleInstanceGuard::acquire(&Config::lock_file_path())?;

        Config::ensure_directories()?;

        tracing::info!("Starting voxd daemon (pid={})", std::process::id());

        // Load the model before listening so a bad setup fails fast
        let transcriber: Arc<dyn Transcriber> =
            Arc::from(transcribe::create_transcriber(&self.config.whisper)?);

        let outputs = output::create_output_chain(&self.config.output);

        let audio_config = self.config.audio.clone();
        let capture: CaptureFactory =
            Arc::new(move || crate::audio::create_source(&audio_config));

        let coordinator =
            SessionCoordinator::new(&self.config, transcriber, outputs, capture);

        let mut listener = hotkey::create_listener(&self.config.hotkey)?;
        let mut events = listener.start().await?;

        let hotkey_desc = format!(
            "{}+{}",
            self.config.hotkey.modifiers.join("+"),
            self.config.hotkey.key
        );
        tracing::info!("Daemon ready, hotkey: {}", hotkey_desc);
        notify::send(
            "voxd",
            &format!("Ready. Press {} to dictate.", hotkey_desc),
            Urgency::Low,
        )
        .await;

        // Persistent streams so no signal between polls is lost
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(HotkeyEvent::Pressed) => {
                            // Dropped triggers are handled inside on_activate
                            coordinator.on_activate();
                        }
                        Some(HotkeyEvent::Released) => {}
                        None => {
                            tracing::error!("Hotkey listener channel closed, shutting down");
                            break;
                        }
                    }
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down");
                    break;
                }
            }
        }

        listener.stop().await?;
        guard.release();
        notify::send_blocking("voxd", "Daemon stopped", Urgency::Low);
        tracing::info!("Daemon stopped");

        Ok(())
    }
}
