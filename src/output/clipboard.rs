//! Clipboard-based text output
//!
//! Uses xclip to place the transcription on the clipboard when no typing
//! tool works. The user pastes manually, so nothing is submitted for them.
//!
//! Requires: xclip installed

use super::TextOutput;
use crate::error::OutputError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Clipboard-based text output
pub struct ClipboardOutput;

impl ClipboardOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClipboardOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TextOutput for ClipboardOutput {
    async fn inject(&self, text: &str) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        let mut child = Command::new("xclip")
            .args(["-selection", "clipboard"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::ToolNotFound("xclip")
                } else {
                    OutputError::ClipboardFailed(e.to_string())
                }
            })?;

        // Write text to stdin, then drop to signal EOF
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| OutputError::ClipboardFailed(e.to_string()))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| OutputError::ClipboardFailed(e.to_string()))?;

        if !status.success() {
            return Err(OutputError::ClipboardFailed(
                "xclip exited with error".to_string(),
            ));
        }

        tracing::info!("Text copied to clipboard ({} chars)", text.chars().count());
        Ok(())
    }

    async fn is_available(&self) -> bool {
        which::which("xclip").is_ok()
    }

    fn name(&self) -> &'static str {
        "clipboard (xclip)"
    }
}
