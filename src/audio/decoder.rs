//! Fragment decoding: base64 → PCM16/WAV → f32 mono at the sink rate.

use base64::{engine::general_purpose, Engine as _};
use std::io::Cursor;

use super::{AudioFragment, PcmBuffer};
use crate::error::{RelayError, RelayResult};

/// Output audio sample rate from Gemini (24kHz) when the mime type omits it
pub const SOURCE_SAMPLE_RATE: u32 = 24000;

/// Decode one fragment and resample it to `target_rate`.
pub fn decode_fragment(fragment: &AudioFragment, target_rate: u32) -> RelayResult<PcmBuffer> {
    let bytes = general_purpose::STANDARD
        .decode(fragment.data.trim())
        .map_err(|e| RelayError::Decode(format!("bad base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(RelayError::Decode("empty fragment".to_string()));
    }

    let mime = fragment.mime_type.to_ascii_lowercase();
    let (samples, rate) = if mime.starts_with("audio/wav") || mime.starts_with("audio/x-wav") {
        decode_wav(&bytes)?
    } else {
        (decode_pcm16(&bytes)?, parse_pcm_rate(&mime))
    };

    if samples.is_empty() {
        return Err(RelayError::Decode("no samples".to_string()));
    }

    Ok(PcmBuffer::new(
        resample_linear(&samples, rate, target_rate),
        target_rate,
    ))
}

/// Read `rate=N` from a mime type such as `audio/pcm;rate=24000`
fn parse_pcm_rate(mime: &str) -> u32 {
    mime.split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse::<u32>().ok())
        .filter(|rate| *rate > 0)
        .unwrap_or(SOURCE_SAMPLE_RATE)
}

/// 16-bit little-endian mono PCM
fn decode_pcm16(bytes: &[u8]) -> RelayResult<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(RelayError::Decode(format!(
            "odd PCM16 payload length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect())
}

/// WAV container, any channel count mixed down to mono
fn decode_wav(bytes: &[u8]) -> RelayResult<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| RelayError::Decode(format!("bad wav: {}", e)))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| RelayError::Decode(format!("bad wav samples: {}", e)))?,
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| RelayError::Decode(format!("bad wav samples: {}", e)))?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}

/// Simple linear resampling (good enough for speech)
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio).round() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let s1 = samples.get(src_idx).copied().unwrap_or(0.0);
        let s2 = samples.get(src_idx + 1).copied().unwrap_or(s1);

        output.push(s1 * (1.0 - frac) + s2 * frac);
    }

    output
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Base64 PCM16 fragment of `frames` samples at `rate`
    pub(crate) fn pcm_fragment(frames: usize, rate: u32, value: i16) -> AudioFragment {
        let bytes: Vec<u8> = (0..frames).flat_map(|_| value.to_le_bytes()).collect();
        AudioFragment::new(
            format!("audio/pcm;rate={}", rate),
            general_purpose::STANDARD.encode(bytes),
        )
    }

    #[test]
    fn pcm_fragment_decodes_with_its_declared_rate() {
        let buffer = decode_fragment(&pcm_fragment(2400, 24000, 16384), 24000).unwrap();
        assert_eq!(buffer.samples.len(), 2400);
        assert!((buffer.duration() - 0.1).abs() < 1e-9);
        assert!((buffer.samples[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn pcm_fragment_is_resampled_to_the_sink_rate() {
        let buffer = decode_fragment(&pcm_fragment(2400, 24000, 100), 48000).unwrap();
        assert_eq!(buffer.sample_rate, 48000);
        assert_eq!(buffer.samples.len(), 4800);
        assert!((buffer.duration() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn missing_rate_assumes_gemini_output_rate() {
        assert_eq!(parse_pcm_rate("audio/pcm"), SOURCE_SAMPLE_RATE);
        assert_eq!(parse_pcm_rate("audio/pcm; rate=16000"), 16000);
        assert_eq!(parse_pcm_rate("audio/pcm;rate=zero"), SOURCE_SAMPLE_RATE);
    }

    #[test]
    fn wav_fragment_is_mixed_down_to_mono() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..800 {
                writer.write_sample(16384i16).unwrap();
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        let fragment =
            AudioFragment::new("audio/wav", general_purpose::STANDARD.encode(cursor.into_inner()));

        let buffer = decode_fragment(&fragment, 8000).unwrap();
        assert_eq!(buffer.samples.len(), 800);
        assert!((buffer.samples[10] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn broken_payloads_are_decode_failures() {
        let not_base64 = AudioFragment::new("audio/pcm;rate=24000", "***");
        assert!(matches!(decode_fragment(&not_base64, 24000), Err(RelayError::Decode(_))));

        let odd = AudioFragment::new("audio/pcm", general_purpose::STANDARD.encode([1u8, 2, 3]));
        assert!(matches!(decode_fragment(&odd, 24000), Err(RelayError::Decode(_))));

        let empty = AudioFragment::new("audio/pcm", "");
        assert!(matches!(decode_fragment(&empty, 24000), Err(RelayError::Decode(_))));
    }
}
