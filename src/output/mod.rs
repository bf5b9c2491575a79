//! Text output module
//!
//! Delivers a finished transcription into the focused application.
//!
//! Fallback chain:
//! 1. xdotool - X11 keyboard simulation
//! 2. ydotool - uinput-based, works on Wayland/TTY, requires ydotoold
//! 3. clipboard - xclip, universal last resort
//!
//! `force_ydotool` swaps the first two entries for Wayland sessions; the
//! clipboard stays last either way.

pub mod clipboard;
pub mod xdotool;
pub mod ydotool;

use crate::config::OutputConfig;
use crate::error::OutputError;

/// Trait for text output implementations
#[async_trait::async_trait]
pub trait TextOutput: Send + Sync {
    /// Inject text into the focused application (or the clipboard)
    async fn inject(&self, text: &str) -> Result<(), OutputError>;

    /// Check if this output method is available
    async fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Factory function that returns the fallback chain of output methods
pub fn create_output_chain(config: &OutputConfig) -> Vec<Box<dyn TextOutput>> {
    let typed: [Box<dyn TextOutput>; 2] = if config.force_ydotool {
        [
            Box::new(ydotool::YdotoolOutput::new(config.type_delay_ms)),
            Box::new(xdotool::XdotoolOutput::new(config.type_delay_ms)),
        ]
    } else {
        [
            Box::new(xdotool::XdotoolOutput::new(config.type_delay_ms)),
            Box::new(ydotool::YdotoolOutput::new(config.type_delay_ms)),
        ]
    };

    let mut chain: Vec<Box<dyn TextOutput>> = typed.into();
    chain.push(Box::new(clipboard::ClipboardOutput::new()));
    chain
}

/// Try each output method in the chain until one succeeds
pub async fn deliver(chain: &[Box<dyn TextOutput>], text: &str) -> Result<(), OutputError> {
    for output in chain {
        if !output.is_available().await {
            tracing::debug!("{} not available, trying next", output.name());
            continue;
        }

        match output.inject(text).await {
            Ok(()) => {
                tracing::info!("Text delivered via {}", output.name());
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("{} failed: {}, trying next", output.name(), e);
            }
        }
    }

    Err(OutputError::AllMethodsFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubOutput {
        name: &'static str,
        available: bool,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl TextOutput for StubOutput {
        async fn inject(&self, _text: &str) -> Result<(), OutputError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(OutputError::InjectionFailed("stub".to_string()))
            } else {
                Ok(())
            }
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn stub(
        name: &'static str,
        available: bool,
        fail: bool,
    ) -> (Box<dyn TextOutput>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(StubOutput {
                name,
                available,
                fail,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn test_default_chain_order() {
        let chain = create_output_chain(&OutputConfig::default());
        let names: Vec<&str> = chain.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["xdotool", "ydotool", "clipboard (xclip)"]);
    }

    #[test]
    fn test_force_ydotool_reorders_front_only() {
        let config = OutputConfig {
            force_ydotool: true,
            ..OutputConfig::default()
        };
        let chain = create_output_chain(&config);
        let names: Vec<&str> = chain.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["ydotool", "xdotool", "clipboard (xclip)"]);
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let (a, a_calls) = stub("a", true, false);
        let (b, b_calls) = stub("b", true, false);
        let chain = vec![a, b];

        deliver(&chain, "hello").await.unwrap();
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unavailable_methods_are_skipped() {
        let (a, a_calls) = stub("a", false, false);
        let (b, b_calls) = stub("b", true, false);
        let chain = vec![a, b];

        deliver(&chain, "hello").await.unwrap();
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_falls_through_to_next() {
        let (a, a_calls) = stub("a", true, true);
        let (b, b_calls) = stub("b", true, false);
        let chain = vec![a, b];

        deliver(&chain, "hello").await.unwrap();
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_failures_reported() {
        let (a, _) = stub("a", true, true);
        let (b, _) = stub("b", false, false);
        let chain = vec![a, b];

        let result = deliver(&chain, "hello").await;
        assert!(matches!(result, Err(OutputError::AllMethodsFailed)));
    }
}
