//! Audio capture module
//!
//! Defines the chunked PCM capture boundary: a [`ChunkSource`] yields
//! fixed-size blocks of signed 16-bit mono samples, and a finished recording
//! is packaged as a [`Waveform`].

pub mod capture;

use crate::config::AudioConfig;
use crate::error::AudioError;

/// One fixed-size block of captured samples (i16 mono).
/// Immutable once captured.
pub type AudioChunk = Vec<i16>;

/// A finalized, complete recording ready for transcription.
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count (always 1 for microphone capture)
    pub channels: u16,
    /// Concatenated PCM samples
    pub samples: Vec<i16>,
}

impl Waveform {
    /// Build a waveform by concatenating captured chunks
    pub fn from_chunks(chunks: Vec<AudioChunk>, sample_rate: u32) -> Self {
        let mut samples = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for chunk in chunks {
            samples.extend_from_slice(&chunk);
        }
        Self {
            sample_rate,
            channels: 1,
            samples,
        }
    }

    /// Duration of the recording in seconds
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Convert to normalized f32 samples as the transcription engine expects
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect()
    }
}

/// Blocking pull source of fixed-size audio chunks.
///
/// Implementations must release the underlying device when dropped,
/// including on error paths.
pub trait ChunkSource: Send {
    /// Block until the next chunk is available and return it.
    ///
    /// A transient capture glitch yields a zero-filled chunk rather than an
    /// error, so one missed read never aborts an otherwise good recording.
    /// An unrecoverable stream failure returns an error.
    fn next_chunk(&mut self) -> Result<AudioChunk, AudioError>;
}

/// Open the configured input device and return a chunk source.
/// Device-open failures are fatal and propagate to the caller.
pub fn create_source(config: &AudioConfig) -> Result<Box<dyn ChunkSource>, AudioError> {
    Ok(Box::new(capture::CpalSource::open(config)?))
}

/// Linear interpolation resampling.
/// Used by live capture and by file transcription to reach the engine rate.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_from_chunks() {
        let chunks = vec![vec![1i16, 2, 3], vec![4, 5, 6]];
        let wave = Waveform::from_chunks(chunks, 16000);
        assert_eq!(wave.samples, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(wave.channels, 1);
        assert_eq!(wave.sample_rate, 16000);
    }

    #[test]
    fn test_waveform_duration() {
        let wave = Waveform::from_chunks(vec![vec![0i16; 8000]], 16000);
        assert!((wave.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_waveform_to_f32_normalizes() {
        let wave = Waveform::from_chunks(vec![vec![i16::MAX, 0, i16::MIN + 1]], 16000);
        let f = wave.to_f32();
        assert!((f[0] - 1.0).abs() < 1e-6);
        assert_eq!(f[1], 0.0);
        assert!((f[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 3:1 ratio, so 8 samples come out as roughly 3
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        let samples: Vec<f32> = vec![];
        let result = resample(&samples, 48000, 16000);
        assert!(result.is_empty());
    }
}
