//! WAV container for wire audio.
//!
//! Outgoing utterances and incoming synthesized replies travel as complete
//! 16-bit mono PCM WAV files (44-byte header, little-endian) so the remote
//! service can parse them without side-channel metadata. Encoding quantizes
//! f32 samples to i16; decoding accepts 16-bit int and 32-bit float payloads
//! and downmixes multi-channel audio to mono.

use crate::error::{VoiceError, VoiceResult};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;

/// Target sample rate for all wire audio (both directions).
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// MIME tag carried alongside outgoing audio payloads.
pub const WAV_ENCODING: &str = "audio/wav";

/// An encoded audio container ready for the wire. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct WireAudioPayload {
    /// Format tag (always `audio/wav` for this codec).
    pub encoding: &'static str,
    /// Sample rate declared in the container header.
    pub sample_rate: u32,
    /// Complete container bytes, header included.
    pub bytes: Vec<u8>,
}

impl WireAudioPayload {
    /// Wrap already-encoded WAV bytes (e.g. received from the wire).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            encoding: WAV_ENCODING,
            sample_rate: TARGET_SAMPLE_RATE,
            bytes,
        }
    }
}

/// Encode mono f32 PCM into a complete 16-bit WAV container.
///
/// Samples are clamped to [-1, 1] before quantization.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<WireAudioPayload> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Encode(e.to_string()))?;
        for &s in samples {
            let quantized = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| VoiceError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::Encode(e.to_string()))?;
    }

    Ok(WireAudioPayload {
        encoding: WAV_ENCODING,
        sample_rate,
        bytes: cursor.into_inner(),
    })
}

/// Decode a WAV container into mono f32 PCM plus its sample rate.
///
/// Multi-channel audio is averaged down to mono. Malformed input yields
/// [`VoiceError::Decode`], which call sites treat as non-fatal.
pub fn decode_wav(bytes: &[u8]) -> VoiceResult<(Vec<f32>, u32)> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(VoiceError::Decode("zero channels in header".to_string()));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) if (1..=32).contains(&bits) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(VoiceError::Decode(format!(
                "unsupported sample format {:?}/{} bits",
                format, bits
            )));
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}
