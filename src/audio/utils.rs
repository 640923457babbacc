// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! PCM16 conversion and signal-level helpers.
//!
//! All audio entering the service is 16-bit signed little-endian PCM, mono,
//! at the configured sample rate. Frames handed to the detectors are `f32`
//! samples normalized to `[-1.0, 1.0]` via division by 32768.

/// Decode PCM16 LE bytes into i16 samples.
///
/// A trailing odd byte, if any, is ignored; callers are expected to reject
/// odd-length payloads before audio reaches this layer.
pub fn pcm16_bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    let num_samples = bytes.len() / 2;
    let mut samples = Vec::with_capacity(num_samples);
    for i in 0..num_samples {
        let offset = i * 2;
        samples.push(i16::from_le_bytes([bytes[offset], bytes[offset + 1]]));
    }
    samples
}

/// Convert i16 samples to f32 normalized to `[-1.0, 1.0]`.
pub fn samples_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Encode i16 samples back into PCM16 LE bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// RMS of normalized f32 samples, in `[0.0, 1.0]` for well-formed input.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Exponential smoothing: `prev + factor * (value - prev)`.
pub fn exp_smoothing(value: f32, prev_value: f32, factor: f32) -> f32 {
    prev_value + factor * (value - prev_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_roundtrip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345];
        let bytes = samples_to_bytes(&samples);
        assert_eq!(pcm16_bytes_to_i16(&bytes), samples);
    }

    #[test]
    fn test_pcm16_decode_little_endian() {
        // 0x0201 little-endian == 513
        let bytes = [0x01u8, 0x02];
        assert_eq!(pcm16_bytes_to_i16(&bytes), vec![513]);
    }

    #[test]
    fn test_pcm16_decode_ignores_trailing_byte() {
        let bytes = [0x01u8, 0x02, 0xff];
        assert_eq!(pcm16_bytes_to_i16(&bytes), vec![513]);
    }

    #[test]
    fn test_normalization() {
        let floats = samples_to_f32(&[0, 16384, -32768]);
        assert!((floats[0] - 0.0).abs() < f32::EPSILON);
        assert!((floats[1] - 0.5).abs() < f32::EPSILON);
        assert!((floats[2] - (-1.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rms_silence() {
        let rms = calculate_rms(&[0.0; 320]);
        assert!((rms - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rms_constant_signal() {
        let rms = calculate_rms(&[0.5; 320]);
        assert!((rms - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_rms_empty() {
        assert!((calculate_rms(&[]) - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_exp_smoothing() {
        let result = exp_smoothing(1.0, 0.0, 0.2);
        assert!((result - 0.2).abs() < f32::EPSILON);

        let result2 = exp_smoothing(1.0, 0.5, 0.5);
        assert!((result2 - 0.75).abs() < f32::EPSILON);
    }
}
