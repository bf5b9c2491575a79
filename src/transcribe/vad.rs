//! Engine-side speech gate backed by the whisper-rs Silero VAD
//!
//! The recorder's RMS gate already filters obvious silence, but a fan or
//! keyboard can keep the RMS above the threshold without any speech in the
//! signal. Feeding such audio to whisper produces hallucinated text. This
//! gate runs the Silero VAD over the finished waveform and rejects it when
//! the detected speech falls short of the configured minimum.

use crate::config::WhisperVadConfig;
use crate::error::TranscribeError;
use std::path::Path;
use std::sync::Mutex;
use whisper_rs::{WhisperVadContext, WhisperVadContextParams, WhisperVadParams};

/// Time span of detected speech, in centiseconds
type Segment = (f32, f32);

/// Speech/no-speech decision over a whole waveform.
pub struct SpeechGate {
    /// VAD context (wrapped in Mutex because WhisperVadContext is not Send/Sync)
    ctx: Mutex<WhisperVadContext>,
    threshold: f32,
    min_speech_duration_ms: u32,
    min_silence_duration_ms: u32,
    speech_pad_ms: u32,
}

impl SpeechGate {
    /// Load the Silero VAD model from `model_path`
    pub fn new(model_path: &Path, config: &WhisperVadConfig) -> Result<Self, TranscribeError> {
        let model_str = model_path
            .to_str()
            .ok_or_else(|| TranscribeError::InitFailed("Invalid VAD model path".to_string()))?;

        tracing::debug!("Loading VAD model from {:?}", model_path);

        let params = WhisperVadContextParams::default();
        let ctx = WhisperVadContext::new(model_str, params).map_err(|e| {
            TranscribeError::InitFailed(format!("Failed to load VAD model: {}", e))
        })?;

        tracing::info!("VAD model loaded");

        Ok(Self {
            ctx: Mutex::new(ctx),
            threshold: config.threshold.clamp(0.0, 1.0),
            min_speech_duration_ms: config.min_speech_duration_ms,
            min_silence_duration_ms: config.min_silence_duration_ms,
            speech_pad_ms: config.speech_pad_ms,
        })
    }

    /// Whether `samples` (f32 mono, 16 kHz) contains enough speech to be
    /// worth transcribing.
    pub fn has_speech(&self, samples: &[f32]) -> Result<bool, TranscribeError> {
        let mut ctx = self.ctx.lock().map_err(|e| {
            TranscribeError::InferenceFailed(format!("Failed to acquire VAD lock: {}", e))
        })?;

        let mut params = WhisperVadParams::new();
        params.set_threshold(self.threshold);
        params.set_min_speech_duration(self.min_speech_duration_ms as i32);

        let detected = ctx
            .segments_from_samples(params, samples)
            .map_err(|e| TranscribeError::InferenceFailed(format!("VAD failed: {}", e)))?;

        // Timestamps are in centiseconds (10ms units)
        let mut segments: Vec<Segment> = Vec::new();
        for i in 0..detected.num_segments() {
            if let (Some(start), Some(end)) = (
                detected.get_segment_start_timestamp(i),
                detected.get_segment_end_timestamp(i),
            ) {
                segments.push((start, end));
            }
        }

        let total_cs = samples.len() as f32 / 16000.0 * 100.0;
        let merged = merge_segments(
            &segments,
            self.min_silence_duration_ms as f32 / 10.0,
            self.speech_pad_ms as f32 / 10.0,
            total_cs,
        );

        let speech_cs: f32 = merged.iter().map(|&(s, e)| e - s).sum();
        let min_speech_cs = self.min_speech_duration_ms as f32 / 10.0;
        let has_speech = !merged.is_empty() && speech_cs >= min_speech_cs;

        tracing::debug!(
            "VAD: {} raw segments, {} merged, {:.2}s speech in {:.2}s audio",
            segments.len(),
            merged.len(),
            speech_cs / 100.0,
            total_cs / 100.0
        );

        Ok(has_speech)
    }
}

// SpeechGate is Send + Sync because the internal WhisperVadContext is wrapped in a Mutex
unsafe impl Send for SpeechGate {}
unsafe impl Sync for SpeechGate {}

/// Pad each segment by `pad_cs` on both sides (clamped to the waveform) and
/// merge segments separated by a gap shorter than `min_gap_cs`.
/// Input segments must be sorted by start time, as the VAD emits them.
fn merge_segments(
    segments: &[Segment],
    min_gap_cs: f32,
    pad_cs: f32,
    total_cs: f32,
) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());

    for &(start, end) in segments {
        let start = (start - pad_cs).max(0.0);
        let end = (end + pad_cs).min(total_cs);

        match merged.last_mut() {
            Some(last) if start - last.1 < min_gap_cs => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_empty() {
        assert!(merge_segments(&[], 50.0, 40.0, 1000.0).is_empty());
    }

    #[test]
    fn test_merge_close_segments() {
        // Gap of 30cs with a 50cs merge window: one segment
        let segments = vec![(100.0, 200.0), (230.0, 300.0)];
        let merged = merge_segments(&segments, 50.0, 0.0, 1000.0);
        assert_eq!(merged, vec![(100.0, 300.0)]);
    }

    #[test]
    fn test_distant_segments_stay_separate() {
        let segments = vec![(100.0, 200.0), (400.0, 500.0)];
        let merged = merge_segments(&segments, 50.0, 0.0, 1000.0);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_padding_clamps_to_waveform() {
        let segments = vec![(10.0, 990.0)];
        let merged = merge_segments(&segments, 50.0, 40.0, 1000.0);
        assert_eq!(merged, vec![(0.0, 1000.0)]);
    }

    #[test]
    fn test_padding_can_trigger_merge() {
        // 100cs gap, 50cs window: separate unpadded, merged with 40cs pads
        let segments = vec![(100.0, 200.0), (300.0, 400.0)];
        assert_eq!(merge_segments(&segments, 50.0, 0.0, 1000.0).len(), 2);
        assert_eq!(merge_segments(&segments, 50.0, 40.0, 1000.0).len(), 1);
    }
}
