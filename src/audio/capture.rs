//! cpal-based chunked audio capture
//!
//! Uses the cpal crate for audio input (PipeWire, PulseAudio, ALSA).
//! cpal streams are not Send, so the stream lives on a dedicated thread and
//! fixed-size chunks are handed over a channel to the recording loop.
//!
//! Glitch policy: when a chunk fails to arrive within the wait window, a
//! zero-filled chunk is substituted and capture continues. A closed channel
//! means the stream itself died and is reported as an error.

use super::{resample, AudioChunk, ChunkSource};
use crate::config::AudioConfig;
use crate::error::AudioError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Parameters for building an audio input stream
struct StreamBuildParams {
    chunk_tx: mpsc::Sender<AudioChunk>,
    chunk_size: usize,
    source_rate: u32,
    target_rate: u32,
    source_channels: usize,
}

/// Chunked capture source backed by a cpal input stream on its own thread
pub struct CpalSource {
    chunk_rx: mpsc::Receiver<AudioChunk>,
    chunk_size: usize,
    chunk_timeout: Duration,
    stop: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalSource {
    /// Open the configured input device and start capturing.
    /// Fails if the device cannot be found or the stream cannot be built.
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait};

        let host = cpal::default_host();

        let device = if config.device == "default" {
            host.default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("default".to_string()))?
        } else {
            find_audio_device(&host, &config.device)?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let source_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let sample_format = supported_config.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            source_rate,
            source_channels,
            sample_format
        );

        let chunk_size = config.chunk_size;
        let target_rate = config.sample_rate;
        let chunk_secs = config.chunk_duration_secs();

        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread_handle = thread::spawn(move || {
            use cpal::traits::StreamTrait;

            let stream_config = cpal::StreamConfig {
                channels: supported_config.channels(),
                sample_rate: supported_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            };

            let err_fn = |err| tracing::warn!("Audio stream error: {}", err);

            let params = StreamBuildParams {
                chunk_tx,
                chunk_size,
                source_rate,
                target_rate,
                source_channels,
            };

            let stream_result = match sample_format {
                cpal::SampleFormat::F32 => {
                    build_stream::<f32>(&device, &stream_config, params, err_fn)
                }
                cpal::SampleFormat::I16 => {
                    build_stream::<i16>(&device, &stream_config, params, err_fn)
                }
                cpal::SampleFormat::U16 => {
                    build_stream::<u16>(&device, &stream_config, params, err_fn)
                }
                format => Err(AudioError::StreamError(format!(
                    "Unsupported sample format: {:?}",
                    format
                ))),
            };

            let stream = match stream_result {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));
            tracing::debug!("Audio capture thread started");

            while !stop_flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(50));
            }

            // Dropping the stream closes the device
            drop(stream);
            tracing::debug!("Audio capture thread stopped");
        });

        // Surface stream build failures as an open error
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                let _ = thread_handle.join();
                return Err(AudioError::StreamError(
                    "Timed out waiting for the audio stream to start".to_string(),
                ));
            }
        }

        // Allow generous slack before declaring a chunk lost
        let chunk_timeout = Duration::from_secs_f32((chunk_secs * 4.0).max(1.0));

        Ok(Self {
            chunk_rx,
            chunk_size,
            chunk_timeout,
            stop,
            thread_handle: Some(thread_handle),
        })
    }
}

impl ChunkSource for CpalSource {
    fn next_chunk(&mut self) -> Result<AudioChunk, AudioError> {
        match self.chunk_rx.recv_timeout(self.chunk_timeout) {
            Ok(chunk) => Ok(chunk),
            Err(RecvTimeoutError::Timeout) => {
                // Glitch policy: substitute silence instead of aborting
                tracing::warn!(
                    "Audio chunk not received within {:?}, substituting silence",
                    self.chunk_timeout
                );
                Ok(vec![0i16; self.chunk_size])
            }
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::StreamError(
                "Capture stream terminated unexpectedly".to_string(),
            )),
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Find an audio input device by name with flexible matching:
/// exact, then case-insensitive, then substring.
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let mut devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .collect();

    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();
    let search_lower = device_name.to_lowercase();

    let position = names
        .iter()
        .position(|n| n == device_name)
        .or_else(|| names.iter().position(|n| n.to_lowercase() == search_lower))
        .or_else(|| {
            names
                .iter()
                .position(|n| n.to_lowercase().contains(&search_lower))
        });

    match position {
        Some(i) => {
            tracing::debug!("Matched audio device: {}", names[i]);
            Ok(devices.swap_remove(i))
        }
        None => Err(AudioError::DeviceNotFound(device_name.to_string())),
    }
}

/// Build an input stream for a specific sample type.
///
/// The callback mixes to mono, resamples to the target rate, converts to
/// i16 and emits fixed-size chunks over the channel.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: StreamBuildParams,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let StreamBuildParams {
        chunk_tx,
        chunk_size,
        source_rate,
        target_rate,
        source_channels,
    } = params;

    let mut pending: Vec<i16> = Vec::with_capacity(chunk_size * 2);

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to f32 and mix to mono
                let mono_f32: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                let resampled = if source_rate != target_rate {
                    resample(&mono_f32, source_rate, target_rate)
                } else {
                    mono_f32
                };

                pending.extend(
                    resampled
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                );

                while pending.len() >= chunk_size {
                    let chunk: AudioChunk = pending.drain(..chunk_size).collect();
                    // Receiver gone means the recording loop stopped; ignore
                    let _ = chunk_tx.send(chunk);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}
