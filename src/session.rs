//! Dictation session coordination
//!
//! One hotkey press runs one session: record, transcribe, deliver. The
//! coordinator enforces single-flight with an atomic flag: a hotkey press
//! while a session is in flight is dropped, not queued. The blocking stages
//! (recording and inference) run on the blocking thread pool so the daemon
//! loop stays responsive to further events and signals.

use crate::audio::ChunkSource;
use crate::config::Config;
use crate::error::AudioError;
use crate::notify::{self, Urgency};
use crate::output::{self, TextOutput};
use crate::recorder::VoiceActivityRecorder;
use crate::transcribe::Transcriber;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Factory producing a fresh capture source per session.
/// The microphone stays closed between sessions.
pub type CaptureFactory =
    Arc<dyn Fn() -> Result<Box<dyn ChunkSource>, AudioError> + Send + Sync>;

/// Clears the in-flight flag when dropped, so a panic anywhere inside the
/// session task can never leave the coordinator refusing all triggers.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs dictation sessions, at most one at a time
pub struct SessionCoordinator {
    recording: Arc<AtomicBool>,
    recorder: Arc<VoiceActivityRecorder>,
    transcriber: Arc<dyn Transcriber>,
    outputs: Arc<Vec<Box<dyn TextOutput>>>,
    capture: CaptureFactory,
    min_chars: usize,
}

impl SessionCoordinator {
    pub fn new(
        config: &Config,
        transcriber: Arc<dyn Transcriber>,
        outputs: Vec<Box<dyn TextOutput>>,
        capture: CaptureFactory,
    ) -> Self {
        Self {
            recording: Arc::new(AtomicBool::new(false)),
            recorder: Arc::new(VoiceActivityRecorder::new(&config.audio)),
            transcriber,
            outputs: Arc::new(outputs),
            capture,
            min_chars: config.output.min_chars,
        }
    }

    /// Whether a session is currently in flight
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Handle a hotkey trigger.
    ///
    /// Starts a session task and returns its handle, or returns `None` when
    /// a session is already in flight (the trigger is dropped). The in-flight
    /// flag is cleared when the session task finishes, on every path.
    pub fn on_activate(&self) -> Option<JoinHandle<()>> {
        if self
            .recording
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Session already in flight, dropping trigger");
            return None;
        }

        let guard = InFlight(self.recording.clone());
        let recorder = self.recorder.clone();
        let transcriber = self.transcriber.clone();
        let outputs = self.outputs.clone();
        let capture = self.capture.clone();
        let min_chars = self.min_chars;

        Some(tokio::spawn(async move {
            let _guard = guard;
            run_session(recorder, transcriber, outputs, capture, min_chars).await;
        }))
    }
}

/// One complete dictation session: record, transcribe, deliver.
/// Every failure is reported to the user and ends the session cleanly.
async fn run_session(
    recorder: Arc<VoiceActivityRecorder>,
    transcriber: Arc<dyn Transcriber>,
    outputs: Arc<Vec<Box<dyn TextOutput>>>,
    capture: CaptureFactory,
    min_chars: usize,
) {
    tracing::info!("Dictation session started");
    notify::send("voxd", "Listening... speak now", Urgency::Low).await;

    let mut source = match (capture)() {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Failed to open audio capture: {}", e);
            notify::send("voxd", &format!("Microphone error: {}", e), Urgency::Critical).await;
            return;
        }
    };

    let record_result = {
        let recorder = recorder.clone();
        tokio::task::spawn_blocking(move || recorder.record(source.as_mut())).await
    };

    let waveform = match record_result {
        Ok(Ok(Some(waveform))) => waveform,
        Ok(Ok(None)) => {
            tracing::info!("Session ended without speech");
            notify::send("voxd", "No speech detected", Urgency::Normal).await;
            return;
        }
        Ok(Err(e)) => {
            tracing::error!("Recording failed: {}", e);
            notify::send("voxd", &format!("Recording error: {}", e), Urgency::Critical).await;
            return;
        }
        Err(e) => {
            tracing::error!("Recording task panicked: {}", e);
            notify::send("voxd", "Recording failed unexpectedly", Urgency::Critical).await;
            return;
        }
    };

    notify::send("voxd", "Transcribing...", Urgency::Low).await;

    let transcribe_result = {
        let transcriber = transcriber.clone();
        tokio::task::spawn_blocking(move || {
            let text = transcriber.transcribe(&waveform)?;
            Ok::<String, crate::error::TranscribeError>(text)
        })
        .await
    };

    let text = match transcribe_result {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::error!("Transcription failed: {}", e);
            notify::send(
                "voxd",
                &format!("Transcription error: {}", e),
                Urgency::Critical,
            )
            .await;
            return;
        }
        Err(e) => {
            tracing::error!("Transcription task panicked: {}", e);
            notify::send("voxd", "Transcription failed unexpectedly", Urgency::Critical).await;
            return;
        }
    };

    if text.chars().count() < min_chars {
        tracing::info!("Transcription too short ({:?}), discarding", text);
        notify::send("voxd", "No speech detected", Urgency::Normal).await;
        return;
    }

    match output::deliver(&outputs, &text).await {
        Ok(()) => {
            let preview: String = text.chars().take(80).collect();
            notify::send("voxd", &preview, Urgency::Normal).await;
            tracing::info!("Session complete ({} chars delivered)", text.chars().count());
        }
        Err(e) => {
            tracing::error!("Delivery failed: {}", e);
            notify::send("voxd", &format!("Output error: {}", e), Urgency::Critical).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioChunk, Waveform};
    use crate::error::{OutputError, TranscribeError};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct ScriptedSource {
        script: Vec<AudioChunk>,
        index: usize,
        chunk_size: usize,
        delay: Duration,
    }

    impl ChunkSource for ScriptedSource {
        fn next_chunk(&mut self) -> Result<AudioChunk, AudioError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let chunk = match self.script.get(self.index) {
                Some(c) => c.clone(),
                None => vec![0i16; self.chunk_size],
            };
            self.index += 1;
            Ok(chunk)
        }
    }

    struct FixedTranscriber {
        text: String,
        calls: Arc<AtomicUsize>,
    }

    impl Transcriber for FixedTranscriber {
        fn transcribe(&self, _audio: &Waveform) -> Result<String, TranscribeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    struct CapturingOutput {
        delivered: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl TextOutput for CapturingOutput {
        async fn inject(&self, text: &str) -> Result<(), OutputError> {
            self.delivered.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "capture"
        }
    }

    /// Small chunks so sessions finish fast: 0.01s chunks, 0.02s silence
    fn test_config() -> Config {
        let mut config = Config::default();
        config.audio.chunk_size = 160;
        config.audio.sample_rate = 16000;
        config.audio.silence_duration_secs = 0.02;
        config.audio.min_recording_secs = 0.01;
        config.audio.max_duration_secs = 2;
        config.output.min_chars = 4;
        config
    }

    fn speech_factory(delay: Duration) -> CaptureFactory {
        Arc::new(move || {
            Ok(Box::new(ScriptedSource {
                script: vec![vec![5000i16; 160]; 3],
                index: 0,
                chunk_size: 160,
                delay,
            }) as Box<dyn ChunkSource>)
        })
    }

    fn coordinator(
        config: &Config,
        text: &str,
        delay: Duration,
    ) -> (SessionCoordinator, Arc<std::sync::Mutex<Vec<String>>>, Arc<AtomicUsize>) {
        let delivered = Arc::new(std::sync::Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let outputs: Vec<Box<dyn TextOutput>> = vec![Box::new(CapturingOutput {
            delivered: delivered.clone(),
        })];
        let transcriber = Arc::new(FixedTranscriber {
            text: text.to_string(),
            calls: calls.clone(),
        });
        let coordinator =
            SessionCoordinator::new(config, transcriber, outputs, speech_factory(delay));
        (coordinator, delivered, calls)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_delivers_transcription() {
        let (coordinator, delivered, _) =
            coordinator(&test_config(), "hello world", Duration::ZERO);

        let handle = coordinator.on_activate().expect("session should start");
        handle.await.unwrap();

        assert_eq!(*delivered.lock().unwrap(), vec!["hello world".to_string()]);
        assert!(!coordinator.is_recording());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_short_transcription_is_discarded() {
        let (coordinator, delivered, calls) = coordinator(&test_config(), "ok", Duration::ZERO);

        let handle = coordinator.on_activate().unwrap();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(delivered.lock().unwrap().is_empty());
        assert!(!coordinator.is_recording());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_trigger_is_dropped_while_in_flight() {
        // Slow chunks keep the first session in flight long enough
        let (coordinator, delivered, calls) =
            coordinator(&test_config(), "first session", Duration::from_millis(20));

        let handle = coordinator.on_activate().expect("first trigger starts");
        assert!(coordinator.is_recording());
        assert!(coordinator.on_activate().is_none());

        handle.await.unwrap();

        // Only the first session ran
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(delivered.lock().unwrap().len(), 1);
        assert!(!coordinator.is_recording());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_trigger_accepted_after_completion() {
        let (coordinator, delivered, _) =
            coordinator(&test_config(), "hello again", Duration::ZERO);

        coordinator.on_activate().unwrap().await.unwrap();
        coordinator.on_activate().unwrap().await.unwrap();

        assert_eq!(delivered.lock().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_output_does_not_wedge_coordinator() {
        struct PanickingOutput;

        #[async_trait::async_trait]
        impl TextOutput for PanickingOutput {
            async fn inject(&self, _text: &str) -> Result<(), OutputError> {
                panic!("output tool crashed");
            }

            async fn is_available(&self) -> bool {
                true
            }

            fn name(&self) -> &'static str {
                "panicking"
            }
        }

        let outputs: Vec<Box<dyn TextOutput>> = vec![Box::new(PanickingOutput)];
        let transcriber = Arc::new(FixedTranscriber {
            text: "hello world".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let coordinator = SessionCoordinator::new(
            &test_config(),
            transcriber,
            outputs,
            speech_factory(Duration::ZERO),
        );

        let handle = coordinator.on_activate().unwrap();
        assert!(handle.await.is_err());

        // The in-flight flag is cleared despite the panic
        assert!(!coordinator.is_recording());
        assert!(coordinator.on_activate().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_capture_failure_resets_flag() {
        let delivered = Arc::new(std::sync::Mutex::new(Vec::new()));
        let outputs: Vec<Box<dyn TextOutput>> = vec![Box::new(CapturingOutput {
            delivered: delivered.clone(),
        })];
        let transcriber = Arc::new(FixedTranscriber {
            text: "unused".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let failing: CaptureFactory =
            Arc::new(|| Err(AudioError::DeviceNotFound("default".to_string())));
        let coordinator =
            SessionCoordinator::new(&test_config(), transcriber, outputs, failing);

        coordinator.on_activate().unwrap().await.unwrap();

        assert!(delivered.lock().unwrap().is_empty());
        // Flag is reset so the next trigger can start a session
        assert!(coordinator.on_activate().is_some());
    }
}
