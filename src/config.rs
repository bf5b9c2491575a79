//! Configuration loading and types for voxd
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/voxd/config.toml)
//! 3. Environment variables (VOXD_*)
//! 4. CLI arguments (highest priority)

use crate::error::VoxdError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content, written by `voxd setup`
pub const DEFAULT_CONFIG: &str = r#"# voxd Configuration
#
# Location: ~/.config/voxd/config.toml
# All settings can be overridden via CLI flags

[hotkey]
# Key that triggers a dictation session, plus modifiers that must be held.
# Key names are evdev KEY_* constant names without the prefix.
# The CLI flag --hotkey accepts combo strings like "ctrl+alt+v".
key = "V"
modifiers = ["LEFTCTRL", "LEFTALT"]

[audio]
# Audio input device ("default" uses system default)
# List devices with: pactl list sources short
device = "default"

# Sample rate in Hz (whisper expects 16000)
sample_rate = 16000

# Samples per captured chunk (chunk duration = chunk_size / sample_rate)
chunk_size = 8192

# RMS loudness threshold in 16-bit sample units. Chunks above this
# count as speech; chunks at or below it count as silence.
silence_threshold = 400.0

# Stop recording after this many seconds of trailing silence
silence_duration_secs = 5.0

# A recording shorter than this never stops on silence alone
min_recording_secs = 0.5

# Hard cap on a single recording (safety limit)
max_duration_secs = 3600

[whisper]
# Model size: tiny, base, small, medium (or a .en variant, or an
# absolute path to a ggml .bin file)
model = "small"

# Language for transcription, fixed for the lifetime of the daemon
language = "en"

# Translate non-English speech to English
translate = false

# Number of CPU threads for inference (omit for auto-detection)
# threads = 4

# [whisper.vad]
# Optional engine-side speech gate, finer-grained and more permissive
# than the recorder's RMS gate. Requires the Silero VAD model file
# (ggml-silero-vad.bin) in the models directory.
# enabled = false
# threshold = 0.3
# min_speech_duration_ms = 200
# min_silence_duration_ms = 500
# speech_pad_ms = 400

[output]
# Put ydotool first in the injection chain (for Wayland sessions where
# xdotool cannot type). The clipboard stays the last resort either way.
force_ydotool = false

# Delay before typing begins, letting focus settle after the
# triggering notification (milliseconds)
type_delay_ms = 300

# Transcriptions shorter than this many characters are discarded
min_chars = 4
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub whisper: WhisperConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Hotkey detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Key name (evdev KEY_* constant name, without the KEY_ prefix)
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Modifier keys that must also be held
    /// Examples: ["LEFTCTRL"], ["LEFTALT", "LEFTSHIFT"]
    #[serde(default = "default_hotkey_modifiers")]
    pub modifiers: Vec<String>,
}

/// Audio capture and voice-activity configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// PipeWire/PulseAudio device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz (whisper expects 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Samples per captured chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// RMS loudness threshold (16-bit sample units)
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,

    /// Trailing silence that ends a recording, in seconds
    #[serde(default = "default_silence_duration")]
    pub silence_duration_secs: f32,

    /// Minimum recording duration before silence may stop it, in seconds
    #[serde(default = "default_min_recording")]
    pub min_recording_secs: f32,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
}

impl AudioConfig {
    /// Duration of one chunk in seconds
    pub fn chunk_duration_secs(&self) -> f32 {
        self.chunk_size as f32 / self.sample_rate as f32
    }
}

/// Whisper speech-to-text configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    /// Model size name (tiny, base, small, medium, optionally .en),
    /// or an absolute path to a ggml .bin file
    #[serde(default = "default_model")]
    pub model: String,

    /// Language code (en, pt, de, ...); fixed for the daemon's lifetime
    #[serde(default = "default_language")]
    pub language: String,

    /// Translate to English if the source language is not English
    #[serde(default)]
    pub translate: bool,

    /// Number of threads for inference (None = auto-detect)
    #[serde(default)]
    pub threads: Option<usize>,

    /// Engine-side speech gate options
    #[serde(default)]
    pub vad: WhisperVadConfig,
}

/// Engine-side voice-activity gate, applied before inference.
///
/// Tuned more permissively than the recorder's RMS gate: the recorder is a
/// coarse pre-filter, this one decides whether the finished waveform holds
/// any actual speech.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperVadConfig {
    /// Enable the gate (requires the Silero VAD model file)
    #[serde(default)]
    pub enabled: bool,

    /// Speech probability threshold (0.0 - 1.0)
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,

    /// Minimum total speech duration to accept a waveform
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_duration_ms: u32,

    /// Gaps shorter than this merge adjacent speech segments
    #[serde(default = "default_min_silence_ms")]
    pub min_silence_duration_ms: u32,

    /// Padding added around each detected speech segment
    #[serde(default = "default_speech_pad_ms")]
    pub speech_pad_ms: u32,

    /// Explicit path to the VAD model file (defaults to the models dir)
    #[serde(default)]
    pub model: Option<String>,
}

/// Text output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Put ydotool ahead of xdotool in the injection chain
    #[serde(default)]
    pub force_ydotool: bool,

    /// Delay before typing begins, in milliseconds
    #[serde(default = "default_type_delay_ms")]
    pub type_delay_ms: u64,

    /// Minimum transcription length (chars) worth delivering
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

fn default_hotkey_key() -> String {
    "V".to_string()
}

fn default_hotkey_modifiers() -> Vec<String> {
    vec!["LEFTCTRL".to_string(), "LEFTALT".to_string()]
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_chunk_size() -> usize {
    8192
}

fn default_silence_threshold() -> f32 {
    400.0
}

fn default_silence_duration() -> f32 {
    5.0
}

fn default_min_recording() -> f32 {
    0.5
}

fn default_max_duration() -> u32 {
    3600
}

fn default_model() -> String {
    "small".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_vad_threshold() -> f32 {
    0.3
}

fn default_min_speech_ms() -> u32 {
    200
}

fn default_min_silence_ms() -> u32 {
    500
}

fn default_speech_pad_ms() -> u32 {
    400
}

fn default_type_delay_ms() -> u64 {
    300
}

fn default_min_chars() -> usize {
    4
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
            modifiers: default_hotkey_modifiers(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            chunk_size: default_chunk_size(),
            silence_threshold: default_silence_threshold(),
            silence_duration_secs: default_silence_duration(),
            min_recording_secs: default_min_recording(),
            max_duration_secs: default_max_duration(),
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
            translate: false,
            threads: None,
            vad: WhisperVadConfig::default(),
        }
    }
}

impl Default for WhisperVadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_vad_threshold(),
            min_speech_duration_ms: default_min_speech_ms(),
            min_silence_duration_ms: default_min_silence_ms(),
            speech_pad_ms: default_speech_pad_ms(),
            model: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            force_ydotool: false,
            type_delay_ms: default_type_delay_ms(),
            min_chars: default_min_chars(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            audio: AudioConfig::default(),
            whisper: WhisperConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voxd")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "voxd")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (for models)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "voxd")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the models directory path
    pub fn models_dir() -> PathBuf {
        Self::data_dir().join("models")
    }

    /// Get the runtime directory for ephemeral files (lock file)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("voxd")
    }

    /// Well-known path of the single-instance PID file
    pub fn lock_file_path() -> PathBuf {
        Self::runtime_dir().join("voxd.pid")
    }

    /// Ensure all required directories exist
    /// Creates: config dir, models dir, and runtime dir
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let models_dir = Self::models_dir();
        std::fs::create_dir_all(&models_dir)?;
        tracing::debug!("Ensured models directory exists: {:?}", models_dir);

        let runtime_dir = Self::runtime_dir();
        std::fs::create_dir_all(&runtime_dir)?;
        tracing::debug!("Ensured runtime directory exists: {:?}", runtime_dir);

        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, VoxdError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| VoxdError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| VoxdError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(model) = std::env::var("VOXD_MODEL") {
        config.whisper.model = model;
    }
    if let Ok(language) = std::env::var("VOXD_LANGUAGE") {
        config.whisper.language = language;
    }
    if let Ok(device) = std::env::var("VOXD_AUDIO_DEVICE") {
        config.audio.device = device;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey.key, "V");
        assert_eq!(config.hotkey.modifiers, vec!["LEFTCTRL", "LEFTALT"]);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.chunk_size, 8192);
        assert_eq!(config.audio.silence_duration_secs, 5.0);
        assert_eq!(config.audio.max_duration_secs, 3600);
        assert_eq!(config.whisper.model, "small");
        assert_eq!(config.output.min_chars, 4);
        assert!(!config.output.force_ydotool);
    }

    #[test]
    fn test_chunk_duration() {
        let audio = AudioConfig::default();
        let dur = audio.chunk_duration_secs();
        assert!((dur - 0.512).abs() < 1e-6);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            [hotkey]
            key = "F13"
            modifiers = []

            [audio]
            device = "default"
            silence_threshold = 250.0
            silence_duration_secs = 2.5

            [whisper]
            model = "base"
            language = "pt"

            [output]
            force_ydotool = true
            min_chars = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.key, "F13");
        assert!(config.hotkey.modifiers.is_empty());
        assert_eq!(config.audio.silence_threshold, 250.0);
        assert_eq!(config.audio.silence_duration_secs, 2.5);
        // Omitted fields keep their defaults
        assert_eq!(config.audio.chunk_size, 8192);
        assert_eq!(config.whisper.model, "base");
        assert_eq!(config.whisper.language, "pt");
        assert!(config.output.force_ydotool);
        assert_eq!(config.output.min_chars, 2);
    }

    #[test]
    fn test_default_config_string_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.audio.chunk_size, 8192);
        assert_eq!(config.whisper.model, "small");
    }

    #[test]
    fn test_vad_config_defaults() {
        let vad = WhisperVadConfig::default();
        assert!(!vad.enabled);
        assert_eq!(vad.threshold, 0.3);
        assert_eq!(vad.min_speech_duration_ms, 200);
        assert_eq!(vad.min_silence_duration_ms, 500);
        assert_eq!(vad.speech_pad_ms, 400);
    }
}
