//! xdotool-based text output
//!
//! Uses xdotool to simulate keyboard input on X11. Types the transcription
//! into the focused window and presses Return to submit it.
//!
//! Requires: xdotool installed, an X11 session (or XWayland focus)

use super::TextOutput;
use crate::error::OutputError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// xdotool-based text output
pub struct XdotoolOutput {
    /// Delay before typing begins, letting window focus settle
    settle_delay_ms: u64,
}

impl XdotoolOutput {
    pub fn new(settle_delay_ms: u64) -> Self {
        Self { settle_delay_ms }
    }
}

#[async_trait::async_trait]
impl TextOutput for XdotoolOutput {
    async fn inject(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        if self.settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settle_delay_ms)).await;
        }

        // The -- ensures text starting with - isn't treated as an option
        let output = Command::new("xdotool")
            .args(["type", "--delay", "10", "--clearmodifiers", "--", text])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::ToolNotFound("xdotool")
                } else {
                    OutputError::InjectionFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OutputError::InjectionFailed(stderr.to_string()));
        }

        // Submit with Return
        let status = Command::new("xdotool")
            .args(["key", "Return"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| OutputError::InjectionFailed(e.to_string()))?;

        if !status.success() {
            return Err(OutputError::InjectionFailed(
                "xdotool key Return failed".to_string(),
            ));
        }

        tracing::debug!("Typed {} chars via xdotool", text.chars().count());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        which::which("xdotool").is_ok()
    }

    fn name(&self) -> &'static str {
        "xdotool"
    }
}
