//! Audio codec, resampler and WAV writer (§4.1).

use std::f32::consts::PI;
use std::sync::OnceLock;

use hound::{SampleFormat, WavSpec, WavWriter};
use voice_agent_core::{AudioCodec, AudioFrame, Error, PcmSegment, Result};

fn mulaw_table() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0f32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let byte = !(i as u8);
            let sign = if byte & 0x80 != 0 { -1i32 } else { 1 };
            let exponent = ((byte >> 4) & 0x07) as i32;
            let mantissa = (byte & 0x0F) as i32;
            let magnitude = ((mantissa << 3) + 0x84) << exponent;
            *slot = (sign * (magnitude - 0x84)) as f32 / 32768.0;
        }
        table
    })
}

fn alaw_table() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0f32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let byte = (i as u8) ^ 0x55;
            let sign = if byte & 0x80 != 0 { 1i32 } else { -1i32 };
            let exponent = ((byte >> 4) & 0x07) as i32;
            let mantissa = (byte & 0x0F) as i32;
            let magnitude = if exponent == 0 {
                (mantissa << 4) + 8
            } else {
                ((mantissa << 4) + 0x108) << (exponent - 1)
            };
            *slot = (sign * magnitude) as f32 / 32768.0;
        }
        table
    })
}

/// Decodes a raw frame into normalized `[-1, 1]` float samples (§4.1).
pub fn decode(frame: &AudioFrame) -> Result<PcmSegment> {
    let sample_rate_hz = frame
        .codec
        .fixed_rate_hz()
        .unwrap_or(frame.sample_rate_hz);

    let samples = match frame.codec {
        AudioCodec::Pcm => {
            if frame.bytes.len() % 2 != 0 {
                return Err(Error::Decode("PCM16 byte length must be even".to_string()));
            }
            frame
                .bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
                .collect()
        }
        AudioCodec::Mulaw => {
            let table = mulaw_table();
            frame.bytes.iter().map(|&b| table[b as usize]).collect()
        }
        AudioCodec::Alaw => {
            let table = alaw_table();
            frame.bytes.iter().map(|&b| table[b as usize]).collect()
        }
    };

    Ok(PcmSegment::with_samples(samples, sample_rate_hz))
}

fn sinc(x: f32) -> f32 {
    if x.abs() < 1e-8 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn blackman(n: usize, taps: usize) -> f32 {
    if taps <= 1 {
        return 1.0;
    }
    let m = (taps - 1) as f32;
    let x = n as f32 / m;
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

/// Builds a normalized (unity DC gain) Blackman-windowed sinc kernel with
/// `TAPS` coefficients, centered at `TAPS / 2`, for the given relative
/// cutoff frequency (fraction of Nyquist, in `(0, 1]`).
const TAPS: usize = 31;

fn build_kernel(relative_cutoff: f32) -> [f32; TAPS] {
    let mut kernel = [0f32; TAPS];
    let center = (TAPS / 2) as f32;
    let mut sum = 0.0;
    for (n, slot) in kernel.iter_mut().enumerate() {
        let x = (n as f32 - center) * relative_cutoff;
        let value = relative_cutoff * sinc(x) * blackman(n, TAPS);
        *slot = value;
        sum += value;
    }
    if sum.abs() > 1e-12 {
        for slot in &mut kernel {
            *slot /= sum;
        }
    }
    kernel
}

fn convolve(samples: &[f32], kernel: &[f32; TAPS]) -> Vec<f32> {
    let half = TAPS / 2;
    let mut out = vec![0f32; samples.len()];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, coeff) in kernel.iter().enumerate() {
            let offset = i as isize + k as isize - half as isize;
            if offset >= 0 && (offset as usize) < samples.len() {
                acc += samples[offset as usize] * coeff;
            }
        }
        *slot = acc;
    }
    out
}

/// Resamples `segment` to `dst_rate_hz` using a 31-tap Blackman-windowed
/// sinc filter (§4.1). Downsampling filters before decimation; upsampling
/// interpolates first and filters the images afterward. Resampling to the
/// same rate is the identity function.
pub fn resample(segment: &PcmSegment, dst_rate_hz: u32) -> PcmSegment {
    if segment.sample_rate_hz == dst_rate_hz || segment.samples.is_empty() {
        return PcmSegment::with_samples(segment.samples.clone(), dst_rate_hz);
    }

    let src_rate = segment.sample_rate_hz as f32;
    let dst_rate = dst_rate_hz as f32;
    let cutoff_hz = src_rate.min(dst_rate) / 2.0;
    let relative_cutoff = (cutoff_hz / (src_rate.max(dst_rate) / 2.0)).min(1.0);

    if dst_rate < src_rate {
        // Downsampling: low-pass filter at the destination Nyquist, then
        // linearly interpolate the filtered signal onto the new grid.
        let kernel = build_kernel(relative_cutoff);
        let filtered = convolve(&segment.samples, &kernel);
        PcmSegment::with_samples(linear_resample(&filtered, src_rate, dst_rate), dst_rate_hz)
    } else {
        // Upsampling: interpolate first, then filter the resulting images.
        let interpolated = linear_resample(&segment.samples, src_rate, dst_rate);
        let kernel = build_kernel(relative_cutoff);
        PcmSegment::with_samples(convolve(&interpolated, &kernel), dst_rate_hz)
    }
}

fn linear_resample(samples: &[f32], src_rate: f32, dst_rate: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let ratio = src_rate / dst_rate;
    let out_len = ((samples.len() as f32) / ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f32 * ratio;
        let idx = pos.floor() as usize;
        let frac = pos - idx as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}

/// Serializes a segment as a canonical 44-byte-header mono 16-bit PCM WAV
/// file (§4.1).
pub fn samples_to_wav(segment: &PcmSegment) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: segment.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Decode(format!("wav writer init: {e}")))?;
        for &sample in &segment.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let quantized = (clamped * 32767.0).round() as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| Error::Decode(format!("wav write sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Decode(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_decode_sample_count_matches_byte_length() {
        let bytes: Vec<u8> = (0..20i16).flat_map(|s| s.to_le_bytes()).collect();
        let frame = AudioFrame {
            bytes: bytes.clone(),
            codec: AudioCodec::Pcm,
            sample_rate_hz: 16_000,
        };
        let segment = decode(&frame).unwrap();
        assert_eq!(segment.samples.len() * 2, bytes.len());
        assert!(segment.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn mulaw_silence_byte_decodes_near_zero() {
        let frame = AudioFrame {
            bytes: vec![0xFF],
            codec: AudioCodec::Mulaw,
            sample_rate_hz: 8_000,
        };
        let segment = decode(&frame).unwrap();
        assert!(segment.samples[0].abs() < 0.01);
    }

    #[test]
    fn odd_length_pcm_is_rejected() {
        let frame = AudioFrame {
            bytes: vec![0x00],
            codec: AudioCodec::Pcm,
            sample_rate_hz: 16_000,
        };
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn resample_to_same_rate_is_identity() {
        let segment = PcmSegment::with_samples(vec![0.1, -0.2, 0.3, 0.0], 16_000);
        let out = resample(&segment, 16_000);
        assert_eq!(out.samples, segment.samples);
    }

    #[test]
    fn resample_changes_sample_count_proportionally() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.01).sin()).collect();
        let segment = PcmSegment::with_samples(samples, 16_000);
        let out = resample(&segment, 8_000);
        assert!((out.samples.len() as i64 - 800).abs() <= 2);
    }

    #[test]
    fn wav_round_trip_reconstructs_samples() {
        let segment = PcmSegment::with_samples(vec![0.5, -0.5, 0.25, -0.25, 0.0], 16_000);
        let wav = samples_to_wav(&segment).unwrap();
        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        let decoded: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.unwrap() as f32 / 32768.0)
            .collect();
        for (original, reconstructed) in segment.samples.iter().zip(decoded.iter()) {
            assert!((original - reconstructed).abs() < 1.0 / 32767.0 + 1e-6);
        }
    }
}
