//! Microphone capture with a push-to-talk gate.
//!
//! Opens the default input device through CPAL and converts the hardware
//! callback into ~4096-sample mono 16 kHz chunks. Chunks are buffered only
//! while the gate is open; `take_buffered_chunks` drains the buffer for one
//! complete utterance. Echo cancellation, noise suppression, and auto gain
//! stay with the platform input path (no user-space DSP here).

use crate::error::{VoiceError, VoiceResult};
use crate::wav::TARGET_SAMPLE_RATE;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate in Hz (default: 16000, the wire rate)
    pub sample_rate: u32,

    /// Samples per buffered chunk (default: 4096, ~256ms at 16kHz)
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            chunk_size: 4096,
        }
    }
}

/// One buffered chunk from the hardware callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono samples (f32, -1.0..1.0) at the target rate.
    pub samples: Vec<f32>,
    /// When the chunk was committed to the buffer.
    pub timestamp: Instant,
}

/// Shared state between the hardware callback and the session.
///
/// The callback appends under the mutex and does nothing else; a contended
/// or poisoned lock drops the chunk rather than blocking or panicking
/// across the FFI boundary.
struct RecordingBuffer {
    chunks: Mutex<Vec<AudioChunk>>,
    gate_open: AtomicBool,
}

impl RecordingBuffer {
    fn new() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            gate_open: AtomicBool::new(false),
        }
    }

    /// Append one chunk if the gate is open. Callable from the audio thread.
    fn push(&self, samples: Vec<f32>) {
        if !self.gate_open.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.push(AudioChunk {
                samples,
                timestamp: Instant::now(),
            });
        }
    }

    fn open_gate(&self) {
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.clear();
        }
        self.gate_open.store(true, Ordering::Release);
    }

    fn close_gate(&self) {
        self.gate_open.store(false, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        self.gate_open.load(Ordering::Acquire)
    }

    fn take(&self) -> Vec<AudioChunk> {
        match self.chunks.lock() {
            Ok(mut chunks) => std::mem::take(&mut *chunks),
            Err(_) => Vec::new(),
        }
    }

    fn buffered_samples(&self) -> usize {
        match self.chunks.lock() {
            Ok(chunks) => chunks.iter().map(|c| c.samples.len()).sum(),
            Err(_) => 0,
        }
    }
}

/// Microphone capability as the session consumes it: a push-to-talk gate
/// over a buffered chunk stream. `CaptureSession` is the hardware
/// implementation; tests substitute scripted sources.
pub trait CaptureSource {
    fn start_recording(&self);
    fn stop_recording(&self);
    fn is_recording(&self) -> bool;
    fn take_buffered_chunks(&self) -> Vec<AudioChunk>;
    fn buffered_samples(&self) -> usize;
    fn sample_rate(&self) -> u32;
    /// Release the hardware path. Idempotent.
    fn cleanup(&mut self);
}

/// Owns the microphone stream and the push-to-talk gate.
pub struct CaptureSession {
    config: CaptureConfig,
    buffer: Arc<RecordingBuffer>,
    stream: Option<Stream>,
}

impl CaptureSession {
    /// Request the default input device and start the processing path.
    ///
    /// The stream runs immediately; nothing is buffered until the gate
    /// opens. Device absence or permission denial surfaces as
    /// [`VoiceError::CaptureUnavailable`].
    pub fn initialize(config: CaptureConfig) -> VoiceResult<Self> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            VoiceError::CaptureUnavailable("no input device available".to_string())
        })?;

        info!(
            "Capture: using input device {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let device_config = device.default_input_config()?;
        let device_rate = device_config.sample_rate().0;
        let channels = device_config.channels() as usize;
        let stream_config: StreamConfig = device_config.clone().into();

        let buffer = Arc::new(RecordingBuffer::new());
        let target_rate = config.sample_rate;
        let chunk_size = config.chunk_size;

        // Accumulator lives in the callback closure; flushed per chunk_size.
        let stream = match device_config.sample_format() {
            SampleFormat::F32 => {
                let buffer_ref = Arc::clone(&buffer);
                let mut pending: Vec<f32> = Vec::with_capacity(chunk_size);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        accumulate(
                            &buffer_ref,
                            &mut pending,
                            data,
                            channels,
                            device_rate,
                            target_rate,
                            chunk_size,
                        );
                    },
                    move |err| warn!("Capture stream error: {}", err),
                    None,
                )?
            }
            SampleFormat::I16 => {
                let buffer_ref = Arc::clone(&buffer);
                let mut pending: Vec<f32> = Vec::with_capacity(chunk_size);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let as_f32: Vec<f32> =
                            data.iter().map(|&s| s as f32 / 32768.0).collect();
                        accumulate(
                            &buffer_ref,
                            &mut pending,
                            &as_f32,
                            channels,
                            device_rate,
                            target_rate,
                            chunk_size,
                        );
                    },
                    move |err| warn!("Capture stream error: {}", err),
                    None,
                )?
            }
            other => {
                return Err(VoiceError::CaptureUnavailable(format!(
                    "unsupported input sample format {:?}",
                    other
                )));
            }
        };

        stream.play()?;

        info!(
            "Capture: ready (mono {} Hz, {}-sample chunks, push-to-talk)",
            target_rate, chunk_size
        );

        Ok(Self {
            config,
            buffer,
            stream: Some(stream),
        })
    }

    /// Open the gate and start buffering. Clears any previous chunks.
    pub fn start_recording(&self) {
        self.buffer.open_gate();
        debug!("Capture: recording started (gate open)");
    }

    /// Close the gate. Buffered chunks are kept for `take_buffered_chunks`.
    pub fn stop_recording(&self) {
        self.buffer.close_gate();
        debug!("Capture: recording stopped (gate closed)");
    }

    /// Whether the gate is currently open.
    pub fn is_recording(&self) -> bool {
        self.buffer.is_open()
    }

    /// Atomically drain and return everything buffered since the gate opened.
    pub fn take_buffered_chunks(&self) -> Vec<AudioChunk> {
        self.buffer.take()
    }

    /// Total samples pending in the buffer, without draining.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.buffered_samples()
    }

    /// Configured target sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Release the hardware stream. Idempotent; also runs on Drop.
    pub fn cleanup(&mut self) {
        self.buffer.close_gate();
        if self.stream.take().is_some() {
            info!("Capture: released input stream");
        }
    }
}

impl CaptureSource for CaptureSession {
    fn start_recording(&self) {
        CaptureSession::start_recording(self);
    }

    fn stop_recording(&self) {
        CaptureSession::stop_recording(self);
    }

    fn is_recording(&self) -> bool {
        CaptureSession::is_recording(self)
    }

    fn take_buffered_chunks(&self) -> Vec<AudioChunk> {
        CaptureSession::take_buffered_chunks(self)
    }

    fn buffered_samples(&self) -> usize {
        CaptureSession::buffered_samples(self)
    }

    fn sample_rate(&self) -> u32 {
        CaptureSession::sample_rate(self)
    }

    fn cleanup(&mut self) {
        CaptureSession::cleanup(self);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Downmix, resample, and flush fixed-size chunks into the buffer.
///
/// Runs on the audio thread: no allocation beyond the chunk vectors, no
/// blocking beyond the buffer mutex.
fn accumulate(
    buffer: &RecordingBuffer,
    pending: &mut Vec<f32>,
    data: &[f32],
    channels: usize,
    device_rate: u32,
    target_rate: u32,
    chunk_size: usize,
) {
    if !buffer.is_open() {
        // Audio from before the gate opened must not leak into the
        // next utterance.
        pending.clear();
        return;
    }
    let converted = to_mono_target_rate(data, channels, device_rate, target_rate);
    for sample in converted {
        pending.push(sample);
        if pending.len() >= chunk_size {
            buffer.push(std::mem::replace(
                pending,
                Vec::with_capacity(chunk_size),
            ));
        }
    }
}

/// Convert interleaved multi-channel audio at any rate to mono at the
/// target rate (nearest-sample pick, same approach as a linear decimator
/// for the downsampling case this path sees in practice).
fn to_mono_target_rate(
    samples: &[f32],
    channels: usize,
    from_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    if channels == 0 || samples.is_empty() {
        return Vec::new();
    }
    let mono: Vec<f32> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    if from_rate == target_rate {
        return mono;
    }
    let out_len = (mono.len() as u64 * target_rate as u64 / from_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = (i as f64 * from_rate as f64 / target_rate as f64) as usize;
        if src_idx >= mono.len() {
            break;
        }
        out.push(mono[src_idx]);
    }
    out
}

/// Concatenate buffered chunks into one contiguous utterance.
pub fn merge_chunks(chunks: &[AudioChunk]) -> Vec<f32> {
    let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
    let mut merged = Vec::with_capacity(total);
    for chunk in chunks {
        merged.extend_from_slice(&chunk.samples);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_config_defaults() {
        let c = CaptureConfig::default();
        assert_eq!(c.sample_rate, 16000);
        assert_eq!(c.chunk_size, 4096);
    }

    #[test]
    fn gate_controls_buffering() {
        let buffer = RecordingBuffer::new();
        buffer.push(vec![0.1; 10]);
        assert_eq!(buffer.buffered_samples(), 0);

        buffer.open_gate();
        buffer.push(vec![0.1; 10]);
        buffer.push(vec![0.2; 5]);
        assert_eq!(buffer.buffered_samples(), 15);

        buffer.close_gate();
        buffer.push(vec![0.3; 10]);
        assert_eq!(buffer.buffered_samples(), 15);
    }

    #[test]
    fn open_gate_clears_previous_chunks() {
        let buffer = RecordingBuffer::new();
        buffer.open_gate();
        buffer.push(vec![0.1; 10]);
        buffer.open_gate();
        assert_eq!(buffer.buffered_samples(), 0);
    }

    #[test]
    fn take_drains_atomically() {
        let buffer = RecordingBuffer::new();
        buffer.open_gate();
        buffer.push(vec![0.1; 8]);
        buffer.push(vec![0.2; 8]);

        let taken = buffer.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(buffer.buffered_samples(), 0);
    }

    #[test]
    fn merge_preserves_order_and_length() {
        let now = Instant::now();
        let chunks = vec![
            AudioChunk { samples: vec![1.0, 2.0], timestamp: now },
            AudioChunk { samples: vec![3.0], timestamp: now },
            AudioChunk { samples: vec![4.0, 5.0], timestamp: now },
        ];
        assert_eq!(merge_chunks(&chunks), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn stereo_48k_converts_to_mono_16k() {
        // 48 kHz stereo, 960 frames = 20ms → 320 mono samples at 16 kHz
        let interleaved: Vec<f32> = (0..960).flat_map(|_| [0.5f32, -0.5f32]).collect();
        let out = to_mono_target_rate(&interleaved, 2, 48_000, 16_000);
        assert_eq!(out.len(), 320);
        for s in out {
            assert!(s.abs() < 1e-6);
        }
    }

    #[test]
    fn closed_gate_discards_pending_audio() {
        let buffer = RecordingBuffer::new();
        let mut pending = Vec::new();

        // Audio arriving before the gate opens is dropped, not carried
        // into the next utterance.
        accumulate(&buffer, &mut pending, &[0.5f32; 100], 1, 16_000, 16_000, 128);
        assert!(pending.is_empty());

        buffer.open_gate();
        accumulate(&buffer, &mut pending, &[0.1f32; 100], 1, 16_000, 16_000, 128);
        assert_eq!(pending.len(), 100);
    }

    #[test]
    #[ignore] // Requires a microphone; run manually
    fn initialize_on_real_hardware() {
        if let Ok(mut session) = CaptureSession::initialize(CaptureConfig::default()) {
            assert!(!session.is_recording());
            session.start_recording();
            assert!(session.is_recording());
            session.cleanup();
            session.cleanup(); // idempotent
        }
    }

    #[test]
    fn accumulate_flushes_fixed_chunks() {
        let buffer = RecordingBuffer::new();
        buffer.open_gate();
        let mut pending = Vec::new();

        let data = vec![0.1f32; 100];
        for _ in 0..5 {
            accumulate(&buffer, &mut pending, &data, 1, 16_000, 16_000, 128);
        }
        // 500 samples → 3 full chunks of 128, remainder pending
        let taken = buffer.take();
        assert_eq!(taken.len(), 3);
        assert!(taken.iter().all(|c| c.samples.len() == 128));
        assert_eq!(pending.len(), 500 - 3 * 128);
    }
}
