//! ydotool-based text output
//!
//! Uses ydotool to simulate keyboard input. This works on Wayland
//! compositors and the TTY because ydotool uses the uinput kernel
//! interface. Presses Enter (keycode 28) after typing to submit.
//!
//! Requires:
//! - ydotool installed
//! - ydotoold daemon running (systemctl --user start ydotool)
//! - User in 'input' group

use super::TextOutput;
use crate::error::OutputError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// ydotool-based text output
pub struct YdotoolOutput {
    /// Delay before typing begins, letting window focus settle
    settle_delay_ms: u64,
}

impl YdotoolOutput {
    pub fn new(settle_delay_ms: u64) -> Self {
        Self { settle_delay_ms }
    }
}

#[async_trait::async_trait]
impl TextOutput for YdotoolOutput {
    async fn inject(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        if self.settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settle_delay_ms)).await;
        }

        // The -- ensures text starting with - isn't treated as an option
        let output = Command::new("ydotool")
            .args(["type", "--", text])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::ToolNotFound("ydotool")
                } else {
                    OutputError::InjectionFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OutputError::InjectionFailed(stderr.to_string()));
        }

        // Enter press and release (KEY_ENTER = 28)
        let status = Command::new("ydotool")
            .args(["key", "28:1", "28:0"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| OutputError::InjectionFailed(e.to_string()))?;

        if !status.success() {
            return Err(OutputError::InjectionFailed(
                "ydotool key press failed".to_string(),
            ));
        }

        tracing::debug!("Typed {} chars via ydotool", text.chars().count());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        if which::which("ydotool").is_err() {
            return false;
        }

        // A no-op type succeeds quickly only when ydotoold is reachable
        Command::new("ydotool")
            .args(["type", ""])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "ydotool"
    }
}
