//! evdev-based hotkey listener
//!
//! Reads key events straight from /dev/input, below the display server,
//! so the hotkey works on X11 and every Wayland compositor alike.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{HotkeyEvent, HotkeyListener};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// The configured combination resolved to evdev key codes
#[derive(Debug, Clone)]
struct Combo {
    key: Key,
    modifiers: Vec<Key>,
}

impl Combo {
    fn from_config(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        Ok(Self {
            key: lookup_key(&config.key)?,
            modifiers: config
                .modifiers
                .iter()
                .map(|m| lookup_key(m))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

/// Folds raw key transitions into hotkey press/release edges.
///
/// The combo engages on the main key going down while every modifier is
/// held, and disengages on the main key going up. Modifiers released
/// mid-hold do not cut an engaged combo short, and kernel key repeats
/// (value 2) never produce duplicate events.
struct ComboTracker {
    combo: Combo,
    held: HashSet<Key>,
    engaged: bool,
}

impl ComboTracker {
    fn new(combo: Combo) -> Self {
        Self {
            combo,
            held: HashSet::new(),
            engaged: false,
        }
    }

    /// Feed one key transition (1 = down, 0 = up, 2 = repeat).
    /// Returns the hotkey edge this transition causes, if any.
    fn on_key(&mut self, key: Key, value: i32) -> Option<HotkeyEvent> {
        match value {
            1 => {
                self.held.insert(key);
            }
            0 => {
                self.held.remove(&key);
            }
            _ => return None,
        }

        if key != self.combo.key {
            return None;
        }

        if value == 1 && !self.engaged && self.modifiers_held() {
            self.engaged = true;
            return Some(HotkeyEvent::Pressed);
        }
        if value == 0 && self.engaged {
            self.engaged = false;
            return Some(HotkeyEvent::Released);
        }
        None
    }

    fn modifiers_held(&self) -> bool {
        self.combo.modifiers.iter().all(|m| self.held.contains(m))
    }
}

/// evdev-based hotkey listener
pub struct EvdevListener {
    combo: Combo,
    device_paths: Vec<PathBuf>,
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevListener {
    /// Resolve the configured combo and locate keyboard devices
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let combo = Combo::from_config(config)?;
        let device_paths = discover_keyboards()?;

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            combo,
            device_paths,
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl HotkeyListener for EvdevListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let combo = self.combo.clone();
        let device_paths = self.device_paths.clone();

        tokio::task::spawn_blocking(move || {
            poll_loop(&device_paths, combo, tx, stop_rx);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

/// Poll all keyboards for key events until told to stop
fn poll_loop(
    device_paths: &[PathBuf],
    combo: Combo,
    tx: mpsc::Sender<HotkeyEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut devices = open_devices(device_paths);
    if devices.is_empty() {
        tracing::error!("No keyboard devices could be opened");
        return;
    }

    tracing::info!(
        "Listening for {:?} with modifiers {:?}",
        combo.key,
        combo.modifiers
    );
    let mut tracker = ComboTracker::new(combo);

    loop {
        match stop_rx.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => {}
            _ => {
                tracing::debug!("Hotkey listener stopping");
                return;
            }
        }

        for device in &mut devices {
            // With a non-blocking fd this returns immediately when idle
            let Ok(events) = device.fetch_events() else {
                continue;
            };
            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                if let Some(edge) = tracker.on_key(key, event.value()) {
                    tracing::debug!("Hotkey {:?}", edge);
                    if tx.blocking_send(edge).is_err() {
                        return;
                    }
                }
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Open devices and switch their fds to non-blocking so fetch_events
/// never stalls the poll loop. Devices that fail to open are skipped.
fn open_devices(paths: &[PathBuf]) -> Vec<Device> {
    paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                None
            }
        })
        .collect()
}

/// Enumerate input devices and keep the ones that look like keyboards.
///
/// When nothing qualifies, distinguish "no keyboard attached" from
/// "not allowed to read /dev/input" so the error can point at the
/// input-group fix.
fn discover_keyboards() -> Result<Vec<PathBuf>, HotkeyError> {
    let keyboards: Vec<PathBuf> = evdev::enumerate()
        .filter(|(_, device)| is_keyboard(device))
        .map(|(path, _)| path)
        .collect();

    if !keyboards.is_empty() {
        return Ok(keyboards);
    }

    let entries = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::DeviceAccess(format!("/dev/input: {}", e)))?;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with("event") {
            continue;
        }
        if let Err(e) = std::fs::File::open(entry.path()) {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                return Err(HotkeyError::DeviceAccess(
                    entry.path().display().to_string(),
                ));
            }
        }
    }

    Err(HotkeyError::NoKeyboard)
}

/// A keyboard reports the full alphabetic range plus Space and Enter.
/// This filters out mice, power buttons and lid switches, which also
/// appear under /dev/input with a handful of key capabilities.
fn is_keyboard(device: &Device) -> bool {
    device.supported_keys().map_or(false, |keys| {
        [Key::KEY_A, Key::KEY_Z, Key::KEY_SPACE, Key::KEY_ENTER]
            .iter()
            .all(|k| keys.contains(*k))
    })
}

/// Resolve a config key name ("V", "scrolllock", "KEY_F13") to an evdev
/// key code. evdev names every key KEY_<NAME>, so the prefix is optional
/// in the config; a few common aliases are accepted on top.
fn lookup_key(name: &str) -> Result<Key, HotkeyError> {
    let mut normalized = name
        .trim()
        .to_ascii_uppercase()
        .replace(|c| c == '-' || c == ' ', "_");
    if !normalized.starts_with("KEY_") {
        normalized.insert_str(0, "KEY_");
    }

    let canonical = match normalized.as_str() {
        "KEY_LCTRL" => "KEY_LEFTCTRL",
        "KEY_RCTRL" => "KEY_RIGHTCTRL",
        "KEY_LALT" => "KEY_LEFTALT",
        "KEY_RALT" => "KEY_RIGHTALT",
        "KEY_LSHIFT" => "KEY_LEFTSHIFT",
        "KEY_RSHIFT" => "KEY_RIGHTSHIFT",
        "KEY_LMETA" | "KEY_SUPER" => "KEY_LEFTMETA",
        "KEY_RMETA" => "KEY_RIGHTMETA",
        "KEY_RETURN" => "KEY_ENTER",
        "KEY_ESCAPE" => "KEY_ESC",
        "KEY_BACKTICK" => "KEY_GRAVE",
        other => other,
    };

    Key::from_str(canonical).map_err(|_| HotkeyError::UnknownKey(name.to_string()))
}
