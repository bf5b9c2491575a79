//! voxd: hotkey-triggered voice dictation daemon for Linux
//!
//! This library provides the core functionality for:
//! - Detecting a hotkey combination via evdev (kernel-level, works on all compositors)
//! - Recording audio via cpal until the speaker falls silent (RMS voice-activity gating)
//! - Transcribing speech using whisper.cpp (fast, local, offline)
//! - Injecting text into the focused application via an xdotool/ydotool/clipboard fallback chain
//!
//! # Flow
//!
//! ```text
//! hotkey press (evdev)
//!     │  dropped when a session is already in flight
//!     ▼
//! SessionCoordinator ──▶ VoiceActivityRecorder (cpal chunks, RMS gate)
//!     │                      records until trailing silence
//!     ▼
//! Transcriber (whisper-rs, optional Silero VAD speech gate)
//!     │
//!     ▼
//! output chain: xdotool ▶ ydotool ▶ clipboard
//! ```
//!
//! Exactly one dictation session runs at a time; the daemon holds a PID
//! lock so only one instance runs per user.

pub mod audio;
pub mod config;
pub mod daemon;
pub mod error;
pub mod hotkey;
pub mod lock;
pub mod notify;
pub mod output;
pub mod recorder;
pub mod session;
pub mod transcribe;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Result, VoxdError};
