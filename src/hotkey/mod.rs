//! Hotkey detection module
//!
//! Kernel-level key event detection using evdev, which works on X11 and
//! every Wayland compositor because it operates below the display server.
//!
//! Requires the user to be in the 'input' group.

#[cfg(target_os = "linux")]
pub mod evdev_listener;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use tokio::sync::mpsc;

/// Events emitted by the hotkey listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The hotkey combination was pressed
    Pressed,
    /// The hotkey was released
    Released,
}

/// Trait for hotkey detection implementations
#[async_trait::async_trait]
pub trait HotkeyListener: Send + Sync {
    /// Start listening for hotkey events
    /// Returns a channel receiver for events
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;

    /// Stop listening and clean up
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Factory function to create the hotkey listener
#[cfg(target_os = "linux")]
pub fn create_listener(config: &HotkeyConfig) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Ok(Box::new(evdev_listener::EvdevListener::new(config)?))
}

/// Parse a combo string like "ctrl+alt+v" (or "<ctrl>+<alt>+v") into a
/// hotkey configuration. The last token is the key, everything before it
/// is a modifier.
pub fn parse_combo(combo: &str) -> Result<HotkeyConfig, HotkeyError> {
    let tokens: Vec<String> = combo
        .split('+')
        .map(|t| t.trim().trim_matches(|c| c == '<' || c == '>').to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return Err(HotkeyError::InvalidCombo(combo.to_string()));
    }

    let (key_token, modifier_tokens) = tokens.split_last().unwrap();

    let modifiers = modifier_tokens
        .iter()
        .map(|m| modifier_name(m).ok_or_else(|| HotkeyError::InvalidCombo(combo.to_string())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HotkeyConfig {
        key: key_token.to_ascii_uppercase(),
        modifiers,
    })
}

/// Map a modifier alias to its evdev key name (left-hand variant)
fn modifier_name(token: &str) -> Option<String> {
    let name = match token.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => "LEFTCTRL",
        "alt" => "LEFTALT",
        "shift" => "LEFTSHIFT",
        "super" | "meta" | "win" => "LEFTMETA",
        "leftctrl" | "rightctrl" | "leftalt" | "rightalt" | "leftshift" | "rightshift"
        | "leftmeta" | "rightmeta" => return Some(token.to_ascii_uppercase()),
        _ => return None,
    };
    Some(name.to_string())
}
