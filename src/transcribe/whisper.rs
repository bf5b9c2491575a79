//! Whisper-based speech-to-text transcription
//!
//! Uses whisper.cpp via the whisper-rs crate for fast, local transcription.
//! The model is loaded once at daemon startup and shared across sessions.

use super::vad::SpeechGate;
use super::Transcriber;
use crate::audio::Waveform;
use crate::config::{Config, WhisperConfig};
use crate::error::TranscribeError;
use std::path::PathBuf;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper-based transcriber
pub struct WhisperTranscriber {
    /// Whisper context (holds the model)
    ctx: WhisperContext,
    /// Language for transcription
    language: String,
    /// Whether to translate to English
    translate: bool,
    /// Number of threads to use
    threads: usize,
    /// Optional engine-side speech gate, applied before inference
    gate: Option<SpeechGate>,
}

impl WhisperTranscriber {
    /// Create a new whisper transcriber, loading the model eagerly
    pub fn new(config: &WhisperConfig) -> Result<Self, TranscribeError> {
        let model_path = resolve_model_path(&config.model)?;

        tracing::info!("Loading whisper model from {:?}", model_path);
        let start = std::time::Instant::now();

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| TranscribeError::ModelNotFound("Invalid path".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| TranscribeError::InitFailed(e.to_string()))?;

        tracing::info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());

        let gate = if config.vad.enabled {
            let vad_model = config
                .vad
                .model
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| Config::models_dir().join("ggml-silero-vad.bin"));
            Some(SpeechGate::new(&vad_model, &config.vad)?)
        } else {
            None
        };

        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4));

        Ok(Self {
            ctx,
            language: config.language.clone(),
            translate: config.translate,
            threads,
            gate,
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &Waveform) -> Result<String, TranscribeError> {
        if audio.samples.is_empty() {
            return Err(TranscribeError::AudioFormat(
                "Empty audio buffer".to_string(),
            ));
        }

        let samples = audio.to_f32();
        let duration_secs = audio.duration_secs();
        tracing::debug!(
            "Transcribing {:.2}s of audio ({} samples)",
            duration_secs,
            samples.len()
        );

        if let Some(ref gate) = self.gate {
            if !gate.has_speech(&samples)? {
                tracing::info!("Speech gate rejected the recording, skipping inference");
                return Ok(String::new());
            }
        }

        let start = std::time::Instant::now();

        // Each transcription gets its own state; the context is shared
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if self.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.language));
        }

        params.set_translate(self.translate);
        params.set_n_threads(self.threads as i32);

        // Disable output we don't need
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        // Improve transcription quality
        params.set_suppress_blank(true);
        params.set_suppress_nst(true);

        // Dictation sessions are short; a single segment avoids spurious
        // splits in the middle of a sentence
        if duration_secs < 30.0 {
            params.set_single_segment(true);
        }

        state
            .full(params, &samples)
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(
                segment
                    .to_str()
                    .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?,
            );
        }

        let result = text.trim().to_string();

        tracing::info!(
            "Transcription completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            if result.chars().count() > 50 {
                format!("{}...", result.chars().take(50).collect::<String>())
            } else {
                result.clone()
            }
        );

        Ok(result)
    }
}

/// Resolve a model name or path to a model file path
fn resolve_model_path(model: &str) -> Result<PathBuf, TranscribeError> {
    // Absolute paths are used directly
    let path = PathBuf::from(model);
    if path.is_absolute() && path.exists() {
        return Ok(path);
    }

    let model_filename = match model {
        "tiny" | "tiny.en" | "base" | "base.en" | "small" | "small.en" | "medium"
        | "medium.en" => get_model_filename(model),
        other if other.ends_with(".bin") => other.to_string(),
        other => {
            return Err(TranscribeError::ModelNotFound(format!(
                "Unknown model: '{}'. Valid models: tiny, base, small, medium (optionally .en)",
                other
            )));
        }
    };

    let models_dir = Config::models_dir();
    let model_path = models_dir.join(&model_filename);
    if model_path.exists() {
        return Ok(model_path);
    }

    // Also check the current directory
    let cwd_path = PathBuf::from(&model_filename);
    if cwd_path.exists() {
        return Ok(cwd_path);
    }

    Err(TranscribeError::ModelNotFound(format!(
        "Model '{}' not found. Looked in:\n  - {}\n  - {}",
        model,
        model_path.display(),
        cwd_path.display()
    )))
}

/// Get the filename for a model
pub fn get_model_filename(model: &str) -> String {
    match model {
        "tiny" => "ggml-tiny.bin",
        "tiny.en" => "ggml-tiny.en.bin",
        "base" => "ggml-base.bin",
        "base.en" => "ggml-base.en.bin",
        "small" => "ggml-small.bin",
        "small.en" => "ggml-small.en.bin",
        "medium" => "ggml-medium.bin",
        "medium.en" => "ggml-medium.en.bin",
        other => other,
    }
    .to_string()
}

/// Get the download URL for a model
pub fn get_model_url(model: &str) -> String {
    let filename = get_model_filename(model);

    format!(
        "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/{}",
        filename
    )
}
