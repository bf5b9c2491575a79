//! Error types for voxd
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the voxd application
#[derive(Error, Debug)]
pub enum VoxdError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio capture error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the single-instance lock
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Another voxd instance is already running (lock held at {0})")]
    AlreadyRunning(String),

    #[error("Failed to create lock file at {path}: {reason}")]
    LockFile { path: String, reason: String },
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown key name: '{0}'. Use evtest to find valid key names.")]
    UnknownKey(String),

    #[error("Invalid hotkey combination: '{0}'. Expected e.g. \"ctrl+alt+v\".")]
    InvalidCombo(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("evdev error: {0}")]
    Evdev(String),
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio device not found: '{0}'. List devices with: pactl list sources short")]
    DeviceNotFound(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),
}

/// Errors related to speech-to-text transcription
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Model not found: {0}\n  Run 'voxd setup --download' to fetch models.")]
    ModelNotFound(String),

    #[error("Whisper initialization failed: {0}")]
    InitFailed(String),

    #[error("Transcription failed: {0}")]
    InferenceFailed(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),
}

/// Errors related to text output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("{0} not found in PATH. Install it via your package manager.")]
    ToolNotFound(&'static str),

    #[error("Text injection failed: {0}")]
    InjectionFailed(String),

    #[error("Clipboard write failed: {0}")]
    ClipboardFailed(String),

    #[error("All output methods failed. Ensure xdotool, ydotool, or xclip is available.")]
    AllMethodsFailed,
}

/// Result type alias using VoxdError
pub type Result<T> = std::result::Result<T, VoxdError>;

#[cfg(target_os = "linux")]
impl From<evdev::Error> for HotkeyError {
    fn from(e: evdev::Error) -> Self {
        HotkeyError::Evdev(e.to_string())
    }
}
