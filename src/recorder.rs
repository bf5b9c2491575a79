//! Voice-activity-gated recording
//!
//! [`VoiceActivityRecorder`] pulls fixed-size chunks from a [`ChunkSource`]
//! and classifies each as speech or silence by RMS loudness. Recording has
//! no timeout before speech begins: the user may wait as long as they like
//! after pressing the hotkey. Once speech has occurred, a configurable run
//! of trailing silence ends the recording. A hard duration cap bounds every
//! session.

use crate::audio::{ChunkSource, Waveform};
use crate::config::AudioConfig;
use crate::error::AudioError;

/// Where the recorder is in the life of one recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No speech heard yet; waits indefinitely
    AwaitingSpeech,
    /// Speech is ongoing
    Speaking,
    /// Speech has occurred and the current chunks are silent
    TrailingSilence,
}

/// Records until the speaker finishes talking.
///
/// Chunk counts are derived from the audio config once at construction so
/// the per-chunk loop only compares integers.
pub struct VoiceActivityRecorder {
    sample_rate: u32,
    silence_threshold: f32,
    /// Consecutive silent chunks that end a recording
    silence_chunks: usize,
    /// Chunks below which silence never ends a recording
    min_chunks: usize,
    /// Hard cap on total chunks per recording
    max_chunks: usize,
}

impl VoiceActivityRecorder {
    pub fn new(config: &AudioConfig) -> Self {
        let chunk_secs = config.chunk_duration_secs();
        let silence_chunks = (config.silence_duration_secs / chunk_secs).ceil() as usize;
        let min_chunks = (config.min_recording_secs / chunk_secs).ceil() as usize;
        let max_chunks = (config.max_duration_secs as f32 / chunk_secs).ceil() as usize;

        Self {
            sample_rate: config.sample_rate,
            silence_threshold: config.silence_threshold,
            silence_chunks: silence_chunks.max(1),
            min_chunks: min_chunks.max(1),
            max_chunks: max_chunks.max(1),
        }
    }

    /// Record one utterance from `source`.
    ///
    /// Returns `Ok(None)` when the recording ended (by hitting the duration
    /// cap) without any speech having been detected. Returns an error only
    /// when the capture stream itself fails.
    pub fn record(&self, source: &mut dyn ChunkSource) -> Result<Option<Waveform>, AudioError> {
        let mut chunks: Vec<Vec<i16>> = Vec::new();
        let mut phase = Phase::AwaitingSpeech;
        let mut trailing_silent = 0usize;

        loop {
            let chunk = source.next_chunk()?;
            let loudness = rms(&chunk);
            let is_speech = loudness > self.silence_threshold;
            chunks.push(chunk);

            match (phase, is_speech) {
                (Phase::AwaitingSpeech, true) => {
                    tracing::debug!("Speech detected (rms={:.0})", loudness);
                    phase = Phase::Speaking;
                }
                (Phase::AwaitingSpeech, false) => {}
                (Phase::Speaking, true) => {}
                (Phase::Speaking, false) => {
                    phase = Phase::TrailingSilence;
                    trailing_silent = 1;
                }
                (Phase::TrailingSilence, true) => {
                    // Speech resumed; the silence run is discarded
                    phase = Phase::Speaking;
                    trailing_silent = 0;
                }
                (Phase::TrailingSilence, false) => {
                    trailing_silent += 1;
                }
            }

            if phase == Phase::TrailingSilence
                && trailing_silent >= self.silence_chunks
                && chunks.len() >= self.min_chunks
            {
                tracing::debug!(
                    "Trailing silence reached ({} chunks), stopping",
                    trailing_silent
                );
                break;
            }

            if chunks.len() >= self.max_chunks {
                tracing::warn!(
                    "Recording hit the maximum duration cap ({} chunks)",
                    self.max_chunks
                );
                break;
            }
        }

        if phase == Phase::AwaitingSpeech {
            tracing::info!("No speech detected, discarding recording");
            return Ok(None);
        }

        let waveform = Waveform::from_chunks(chunks, self.sample_rate);
        tracing::info!("Recorded {:.1}s of audio", waveform.duration_secs());
        Ok(Some(waveform))
    }
}

/// Root-mean-square loudness of a chunk in 16-bit sample units
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;

    /// Samples per chunk used throughout these tests (0.5s at 16 kHz)
    const N: usize = 8000;

    /// Deterministic chunk source driven by a prepared script.
    /// Once the script runs out it yields silence forever.
    struct ScriptedSource {
        script: Vec<AudioChunk>,
        index: usize,
        chunk_size: usize,
    }

    impl ScriptedSource {
        fn new(script: Vec<AudioChunk>, chunk_size: usize) -> Self {
            Self {
                script,
                index: 0,
                chunk_size,
            }
        }
    }

    impl ChunkSource for ScriptedSource {
        fn next_chunk(&mut self) -> Result<AudioChunk, AudioError> {
            let chunk = match self.script.get(self.index) {
                Some(c) => c.clone(),
                None => vec![0i16; self.chunk_size],
            };
            self.index += 1;
            Ok(chunk)
        }
    }

    /// 0.5s chunks at 16 kHz, 5s trailing silence, 0.5s minimum, 30s cap
    fn test_config() -> AudioConfig {
        AudioConfig {
            chunk_size: N,
            sample_rate: 16000,
            silence_threshold: 400.0,
            silence_duration_secs: 5.0,
            min_recording_secs: 0.5,
            max_duration_secs: 30,
            ..AudioConfig::default()
        }
    }

    fn loud(n: usize) -> AudioChunk {
        vec![5000i16; n]
    }

    fn silent(n: usize) -> AudioChunk {
        vec![0i16; n]
    }

    #[test]
    fn test_rms_silence_is_zero() {
        assert_eq!(rms(&[0i16; 100]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_constant_signal() {
        let r = rms(&[1000i16; 64]);
        assert!((r - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_rms_mixed_signal() {
        // RMS of alternating +a/-a is a
        let samples: Vec<i16> = (0..100).map(|i| if i % 2 == 0 { 300 } else { -300 }).collect();
        assert!((rms(&samples) - 300.0).abs() < 1.0);
    }

    #[test]
    fn test_speech_then_silence_stops_after_silence_window() {
        let recorder = VoiceActivityRecorder::new(&test_config());
        let n = N;

        // 5 loud chunks then silence forever. With 0.5s chunks and a 5s
        // silence window the recorder should consume exactly 15 chunks:
        // 5 speech plus 10 trailing silence.
        let script: Vec<AudioChunk> = (0..5).map(|_| loud(n)).collect();
        let mut source = ScriptedSource::new(script, n);

        let wave = recorder.record(&mut source).unwrap().unwrap();
        assert_eq!(wave.samples.len(), 15 * n);
        assert!((wave.duration_secs() - 7.5).abs() < 1e-3);
    }

    #[test]
    fn test_waits_indefinitely_for_speech() {
        // Long leading silence does not end the recording; only the
        // duration cap does, and then the result is None.
        let mut config = test_config();
        config.max_duration_secs = 10; // 20 chunks
        let recorder = VoiceActivityRecorder::new(&config);
        let n = N;

        let mut source = ScriptedSource::new(vec![], n);
        let result = recorder.record(&mut source).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_leading_silence_then_speech_is_kept() {
        let recorder = VoiceActivityRecorder::new(&test_config());
        let n = N;

        // 8 silent chunks (4s, under no deadline), then 2 loud ones
        let mut script: Vec<AudioChunk> = (0..8).map(|_| silent(n)).collect();
        script.extend((0..2).map(|_| loud(n)));
        let mut source = ScriptedSource::new(script, n);

        let wave = recorder.record(&mut source).unwrap().unwrap();
        // 8 leading silent + 2 speech + 10 trailing silent
        assert_eq!(wave.samples.len(), 20 * n);
    }

    #[test]
    fn test_noise_resets_silence_counter() {
        let recorder = VoiceActivityRecorder::new(&test_config());
        let n = N;

        // Speech, near-complete silence run, then a loud interruption:
        // the silence counter starts over.
        let mut script: Vec<AudioChunk> = vec![loud(n)];
        script.extend((0..9).map(|_| silent(n))); // 9 of the 10 needed
        script.push(loud(n));
        let mut source = ScriptedSource::new(script, n);

        let wave = recorder.record(&mut source).unwrap().unwrap();
        // 1 + 9 + 1 + 10 fresh trailing silent chunks
        assert_eq!(wave.samples.len(), 21 * n);
    }

    #[test]
    fn test_max_duration_cap_with_speech() {
        let mut config = test_config();
        config.max_duration_secs = 5; // 10 chunks
        let recorder = VoiceActivityRecorder::new(&config);
        let n = N;

        // Continuous speech never stops on silence; the cap cuts it off
        let script: Vec<AudioChunk> = (0..100).map(|_| loud(n)).collect();
        let mut source = ScriptedSource::new(script, n);

        let wave = recorder.record(&mut source).unwrap().unwrap();
        assert_eq!(wave.samples.len(), 10 * n);
    }

    #[test]
    fn test_short_burst_respects_min_recording() {
        let mut config = test_config();
        config.min_recording_secs = 3.0; // 6 chunks
        config.silence_duration_secs = 0.5; // 1 chunk
        let recorder = VoiceActivityRecorder::new(&config);
        let n = N;

        // One loud chunk then silence. The 1-chunk silence window is
        // satisfied immediately, but the minimum holds it open to 6 chunks.
        let script = vec![loud(n)];
        let mut source = ScriptedSource::new(script, n);

        let wave = recorder.record(&mut source).unwrap().unwrap();
        assert_eq!(wave.samples.len(), 6 * n);
    }

    #[test]
    fn test_stream_failure_propagates() {
        struct FailingSource;
        impl ChunkSource for FailingSource {
            fn next_chunk(&mut self) -> Result<AudioChunk, AudioError> {
                Err(AudioError::StreamError("device unplugged".to_string()))
            }
        }

        let recorder = VoiceActivityRecorder::new(&test_config());
        let result = recorder.record(&mut FailingSource);
        assert!(matches!(result, Err(AudioError::StreamError(_))));
    }
}
