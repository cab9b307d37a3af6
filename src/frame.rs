//! Fixed-format PCM frames and sample conversions.
//!
//! The session format is fixed: 24 kHz, mono, 16-bit signed PCM, 480-sample
//! frames (20 ms). Conversions between integer PCM and normalized float
//! follow the historical contract of the processor: divide by 32768 on the
//! way in, scale by 32767 and saturate to the full i16 range on the way out.
//! The 32767/32768 asymmetry is deliberate; downstream consumers depend on
//! the existing numeric behavior.

use std::time::Duration;

/// Session sample rate in Hz.
pub const SAMPLE_RATE: u32 = 24_000;

/// Frame duration in milliseconds.
pub const FRAME_MS: u64 = 20;

/// Samples per frame: 20 ms at 24 kHz.
pub const FRAME_SAMPLES: usize = 480;

/// Bytes per 16-bit PCM sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Worst-case interval between capture reads; also the stop-observation bound.
pub fn frame_period() -> Duration {
    Duration::from_millis(FRAME_MS)
}

/// Convert integer PCM to normalized float, writing into the prefix of `out`.
///
/// Only `pcm.len()` samples are written; callers pass the slice of samples the
/// last capture read actually produced.
pub fn to_float(pcm: &[i16], out: &mut [f32]) {
    for (dst, &sample) in out.iter_mut().zip(pcm) {
        *dst = f32::from(sample) / 32_768.0;
    }
}

/// Convert float samples back to integer PCM with saturation.
///
/// Scales by 32767 and clamps to [-32768, 32767] before narrowing, so values
/// outside the nominal [-1, 1] range saturate instead of wrapping.
pub fn to_pcm(samples: &[f32], out: &mut [i16]) {
    for (dst, &sample) in out.iter_mut().zip(samples) {
        let scaled = (sample * 32_767.0).round();
        *dst = if scaled >= f32::from(i16::MAX) {
            i16::MAX
        } else if scaled <= f32::from(i16::MIN) {
            i16::MIN
        } else {
            scaled as i16
        };
    }
}

/// Encode PCM samples as the little-endian byte payload delivered to sinks.
pub fn encode_le(pcm: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pcm.len() * BYTES_PER_SAMPLE);
    for sample in pcm {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Count samples that are not silence; used for periodic loop diagnostics.
pub(crate) fn non_zero_samples(pcm: &[i16]) -> usize {
    pcm.iter().filter(|&&sample| sample != 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(sample: i16) -> i16 {
        let mut float_buf = [0.0f32; 1];
        let mut pcm_buf = [0i16; 1];
        to_float(&[sample], &mut float_buf);
        to_pcm(&float_buf, &mut pcm_buf);
        pcm_buf[0]
    }

    #[test]
    fn round_trip_is_exact_in_the_linear_region() {
        // Below 16384 the 32767/32768 asymmetry is under half an LSB, so the
        // identity transform reproduces the sample exactly.
        for sample in [-16383i16, -1000, -1, 0, 1, 777, 16383] {
            assert_eq!(round_trip(sample), sample, "sample {sample}");
        }
    }

    #[test]
    fn round_trip_drift_never_exceeds_one_lsb() {
        for sample in i16::MIN..=i16::MAX {
            let back = round_trip(sample);
            let drift = i32::from(back) - i32::from(sample);
            assert!(drift.abs() <= 1, "sample {sample} drifted to {back}");
        }
    }

    #[test]
    fn reconstruction_saturates_instead_of_wrapping() {
        let mut out = [0i16; 4];
        to_pcm(&[2.0, -2.0, 1.5, -1.5], &mut out);
        assert_eq!(out, [i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn conversion_only_touches_the_prefix() {
        let mut float_buf = [9.0f32; 4];
        to_float(&[0, 0], &mut float_buf);
        assert_eq!(float_buf[0], 0.0);
        assert_eq!(float_buf[1], 0.0);
        // Trailing content beyond the read count is left alone.
        assert_eq!(float_buf[2], 9.0);
        assert_eq!(float_buf[3], 9.0);
    }

    #[test]
    fn encode_le_is_little_endian() {
        let bytes = encode_le(&[0x0102, -2]);
        assert_eq!(bytes, vec![0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn frame_constants_are_consistent() {
        assert_eq!(
            FRAME_SAMPLES as u64,
            u64::from(SAMPLE_RATE) * FRAME_MS / 1000
        );
    }

    #[test]
    fn non_zero_samples_counts_only_non_silence() {
        assert_eq!(non_zero_samples(&[0, 1, 0, -1, 0]), 2);
        assert_eq!(non_zero_samples(&[]), 0);
    }
}
