//! Desktop notifications via notify-send
//!
//! The daemon has no window, so notifications are the only user-visible
//! progress feedback during a dictation session. A missing or broken
//! notification daemon must never break dictation, so failures are logged
//! at debug level and otherwise ignored.

use std::process::Stdio;
use tokio::process::Command;

/// Notification urgency, mapped onto notify-send's levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Normal,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Normal => "normal",
            Urgency::Critical => "critical",
        }
    }
}

/// Send a desktop notification. Best-effort only.
pub async fn send(title: &str, body: &str, urgency: Urgency) {
    let result = Command::new("notify-send")
        .args([
            "--app-name=voxd",
            &format!("--urgency={}", urgency.as_str()),
            "--expire-time=3000",
            title,
            body,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::debug!("notify-send exited with {}", status),
        Err(e) => tracing::debug!("notify-send unavailable: {}", e),
    }
}

/// Blocking variant for shutdown paths where the runtime is winding down
pub fn send_blocking(title: &str, body: &str, urgency: Urgency) {
    let result = std::process::Command::new("notify-send")
        .args([
            "--app-name=voxd",
            &format!("--urgency={}", urgency.as_str()),
            "--expire-time=3000",
            title,
            body,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    if let Err(e) = result {
        tracing::debug!("notify-send unavailable: {}", e);
    }
}
