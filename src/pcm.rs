// PCM normalization
// Converts interleaved little-endian int16 / float32 byte streams into mono
// f32 samples shared by both analyzers.

const INT16_SCALE: f32 = 1.0 / 32768.0;

/// Decode an interleaved little-endian PCM byte buffer into mono samples.
///
/// Channels are averaged per sample index; only finite channel values count
/// toward the average. Sample groups with no finite channel value are
/// skipped, as are trailing bytes that do not form a complete group.
pub fn decode_mono(bytes: &[u8], channels: usize, is_float32: bool) -> Vec<f32> {
    let channels = channels.clamp(1, 8);
    let bytes_per_sample = if is_float32 { 4 } else { 2 };
    let group = bytes_per_sample * channels;
    if bytes.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(bytes.len() / group);
    for chunk in bytes.chunks_exact(group) {
        let mut sum = 0.0f32;
        let mut valid = 0u32;
        for ch in 0..channels {
            let start = ch * bytes_per_sample;
            let value = if is_float32 {
                f32::from_le_bytes([
                    chunk[start],
                    chunk[start + 1],
                    chunk[start + 2],
                    chunk[start + 3],
                ])
            } else {
                f32::from(i16::from_le_bytes([chunk[start], chunk[start + 1]])) * INT16_SCALE
            };
            if value.is_finite() {
                sum += value;
                valid += 1;
            }
        }
        if valid > 0 {
            out.push(sum / valid as f32);
        }
    }
    out
}

/// Root mean square of a frame.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Frame energy in dB full scale, floored at -120 dB.
pub fn energy_db(rms: f32) -> f32 {
    if rms > 0.0 {
        (20.0 * rms.log10()).max(-120.0)
    } else {
        -120.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn f32_bytes(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_int16_mono() {
        let bytes = int16_bytes(&[0, 16384, -16384, 32767]);
        let samples = decode_mono(&bytes, 1, false);
        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-6);
        assert!((samples[2] + 0.5).abs() < 1e-6);
        assert!(samples[3] > 0.999);
    }

    #[test]
    fn test_decode_float32_stereo_averages_channels() {
        let bytes = f32_bytes(&[0.5, -0.5, 1.0, 0.0]);
        let samples = decode_mono(&bytes, 2, true);
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_skips_non_finite_channels() {
        let bytes = f32_bytes(&[f32::NAN, 0.25, f32::INFINITY, f32::NEG_INFINITY]);
        let samples = decode_mono(&bytes, 2, true);
        // First group averages over the single finite channel; second group
        // has none and is dropped.
        assert_eq!(samples.len(), 1);
        assert!((samples[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_decode_ignores_trailing_partial_group() {
        let mut bytes = int16_bytes(&[100, 200]);
        bytes.push(0x7f);
        let samples = decode_mono(&bytes, 2, false);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_mono(&[], 2, false).is_empty());
    }

    #[test]
    fn test_energy_db_floor() {
        assert_eq!(energy_db(0.0), -120.0);
        assert_eq!(energy_db(1e-10), -120.0);
        assert!((energy_db(1.0) - 0.0).abs() < 1e-6);
        assert!((energy_db(0.1) + 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_rms_sine() {
        let samples: Vec<f32> = (0..48000)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48000.0).sin())
            .collect();
        let r = rms(&samples);
        assert!((r - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }
}
