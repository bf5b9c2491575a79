//! Speech-to-text transcription module
//!
//! Local whisper.cpp inference via the whisper-rs crate, optionally guarded
//! by an engine-side speech gate (Silero VAD) that suppresses hallucinated
//! output on speech-free recordings.

pub mod vad;
pub mod whisper;

use crate::audio::Waveform;
use crate::config::WhisperConfig;
use crate::error::TranscribeError;

/// Trait for speech-to-text implementations
pub trait Transcriber: Send + Sync {
    /// Transcribe a finished recording to text.
    ///
    /// Returns an empty string when the engine decides the recording holds
    /// no speech; callers treat that the same as a too-short transcription.
    fn transcribe(&self, audio: &Waveform) -> Result<String, TranscribeError>;
}

/// Factory function to create the configured transcriber.
/// Model loading happens here, once, before the daemon starts listening.
pub fn create_transcriber(config: &WhisperConfig) -> Result<Box<dyn Transcriber>, TranscribeError> {
    tracing::info!(
        "Creating transcriber: model={}, language={}, vad={}",
        config.model,
        config.language,
        config.vad.enabled
    );

    Ok(Box::new(whisper::WhisperTranscriber::new(config)?))
}
