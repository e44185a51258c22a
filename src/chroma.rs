// Chroma extraction: a coarse 12-bin fold of the conditioned spectrum, a
// CQT-style Gaussian projection for finer resolutions, and the running
// HPCP state.

pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Width of the CQT Gaussian in cents.
const SPREAD_CENTS: f64 = 60.0;
/// FWHM-to-sigma conversion.
const GAUSS_FWHM: f64 = 2.3548;
/// New-observation weight of the HPCP EMA.
const HPCP_ALPHA: f32 = 0.2;

/// MIDI note number of a frequency under a reference-pitch offset in cents.
fn midi_note(freq_hz: f64, cents: f64) -> f64 {
    69.0 + 12.0 * (freq_hz / 440.0).log2() - cents / 100.0
}

/// Coarse chroma: each spectral bin inside `[min_hz, max_hz]` is added to
/// the pitch class of its nearest semitone.
pub fn fold_simple(
    spectrum: &[f64],
    bin_hz: f64,
    min_hz: f64,
    max_hz: f64,
    cents: f32,
) -> [f32; 12] {
    let mut chroma = [0.0f64; 12];
    if bin_hz > 0.0 {
        let half = spectrum.len().saturating_sub(1);
        for k in 1..half {
            let freq = k as f64 * bin_hz;
            if freq < min_hz || freq > max_hz {
                continue;
            }
            let magnitude = spectrum[k];
            if !(magnitude > 0.0) {
                continue;
            }
            let pc = (midi_note(freq, f64::from(cents)).round() as i64).rem_euclid(12) as usize;
            chroma[pc] += magnitude;
        }
    }
    let mut out = [0.0f32; 12];
    for (dst, &src) in out.iter_mut().zip(chroma.iter()) {
        *dst = src as f32;
    }
    out
}

struct CqtEntry {
    bin: usize,
    pitch_class: usize,
    weight: f64,
}

/// Packed spectral-bin projection table for CQT-style chroma.
///
/// Keyed by the spectrum geometry, the chroma resolution, and the tuning
/// offset; rebuilt whenever any of those changes.
pub struct CqtTable {
    half_len: usize,
    bins_per_octave: usize,
    cents: f32,
    entries: Vec<CqtEntry>,
}

impl CqtTable {
    pub fn build(
        half_len: usize,
        bin_hz: f64,
        min_hz: f64,
        max_hz: f64,
        bins_per_octave: usize,
        cents: f32,
    ) -> Self {
        let sigma = (SPREAD_CENTS / 100.0) / GAUSS_FWHM;
        let mut entries = Vec::new();
        for k in 1..half_len {
            let freq = k as f64 * bin_hz;
            if freq < min_hz || freq > max_hz {
                continue;
            }
            let midi = midi_note(freq, f64::from(cents));
            let nearest = midi.round();
            let dist = midi - nearest;
            let weight = (-0.5 * (dist / sigma).powi(2)).exp();
            if weight < 1e-4 {
                continue;
            }
            let pitch_class = (nearest as i64).rem_euclid(12) as usize;
            entries.push(CqtEntry {
                bin: k,
                pitch_class,
                weight,
            });
        }
        Self {
            half_len,
            bins_per_octave,
            cents,
            entries,
        }
    }

    pub fn matches(&self, half_len: usize, bins_per_octave: usize, cents: f32) -> bool {
        self.half_len == half_len
            && self.bins_per_octave == bins_per_octave
            && (self.cents - cents).abs() < 0.5
    }

    pub fn project(&self, spectrum: &[f64]) -> [f32; 12] {
        let mut chroma = [0.0f64; 12];
        for entry in &self.entries {
            if let Some(&magnitude) = spectrum.get(entry.bin) {
                if magnitude > 0.0 {
                    chroma[entry.pitch_class] += magnitude * entry.weight;
                }
            }
        }
        let mut out = [0.0f32; 12];
        for (dst, &src) in out.iter_mut().zip(chroma.iter()) {
            *dst = src as f32;
        }
        out
    }
}

/// L1-normalize in place; false (and all zeros) when there is no energy.
pub fn normalize(chroma: &mut [f32; 12]) -> bool {
    let mut sum = 0.0f32;
    for &value in chroma.iter() {
        if value.is_finite() && value > 0.0 {
            sum += value;
        }
    }
    if sum <= 1e-9 {
        chroma.fill(0.0);
        return false;
    }
    for value in chroma.iter_mut() {
        if value.is_finite() && *value > 0.0 {
            *value /= sum;
        } else {
            *value = 0.0;
        }
    }
    true
}

/// Running harmonic pitch class profile, EMA-smoothed from per-frame
/// instantaneous chroma and renormalized to sum one.
pub struct Hpcp {
    values: [f32; 12],
    initialized: bool,
}

impl Hpcp {
    pub fn new() -> Self {
        Self {
            values: [0.0; 12],
            initialized: false,
        }
    }

    pub fn values(&self) -> &[f32; 12] {
        &self.values
    }

    pub fn update(&mut self, instantaneous: &[f32; 12]) {
        if !self.initialized {
            self.values = *instantaneous;
            self.initialized = true;
        } else {
            for (value, &inst) in self.values.iter_mut().zip(instantaneous.iter()) {
                *value = (1.0 - HPCP_ALPHA) * *value + HPCP_ALPHA * inst;
            }
        }
        normalize(&mut self.values);
    }

    pub fn reset(&mut self) {
        self.values = [0.0; 12];
        self.initialized = false;
    }
}

impl Default for Hpcp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::SpectrumAnalyzer;
    use std::f32::consts::PI;

    const BIN_HZ: f64 = 48_000.0 / 4096.0;

    fn sine_spectrum(freq: f32) -> Vec<f64> {
        let frame: Vec<f32> = (0..4096)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / 48_000.0).sin())
            .collect();
        let mut fft = SpectrumAnalyzer::new(4096).unwrap();
        let mut mags = Vec::new();
        fft.magnitudes(&frame, &mut mags);
        mags
    }

    #[test]
    fn test_simple_fold_pure_a4() {
        let spectrum = sine_spectrum(440.0);
        let mut chroma = fold_simple(&spectrum, BIN_HZ, 50.0, 5000.0, 0.0);
        assert!(normalize(&mut chroma));
        assert!(chroma[9] > 0.6, "A bin should dominate: {chroma:?}");
    }

    #[test]
    fn test_cqt_projection_pure_a4() {
        let spectrum = sine_spectrum(440.0);
        let table = CqtTable::build(2048, BIN_HZ, 50.0, 5000.0, 36, 0.0);
        let mut chroma = table.project(&spectrum);
        assert!(normalize(&mut chroma));
        assert!(chroma[9] > 0.6, "A bin should dominate: {chroma:?}");
    }

    #[test]
    fn test_fold_respects_tuning_offset() {
        // A sine 20 cents sharp of A4 still lands on pitch class A when the
        // tuning estimate is passed through.
        let freq = 440.0 * (20.0f32 / 1200.0).exp2();
        let spectrum = sine_spectrum(freq);
        let mut chroma = fold_simple(&spectrum, BIN_HZ, 50.0, 5000.0, 20.0);
        assert!(normalize(&mut chroma));
        let top = (0..12)
            .max_by(|&a, &b| chroma[a].partial_cmp(&chroma[b]).unwrap())
            .unwrap();
        assert_eq!(top, 9);
    }

    #[test]
    fn test_cqt_table_rebuild_key() {
        let table = CqtTable::build(2048, BIN_HZ, 50.0, 5000.0, 36, 0.0);
        assert!(table.matches(2048, 36, 0.2));
        assert!(!table.matches(2048, 36, 5.0));
        assert!(!table.matches(1024, 36, 0.0));
        assert!(!table.matches(2048, 48, 0.0));
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut chroma = [0.0f32; 12];
        assert!(!normalize(&mut chroma));
        assert!(chroma.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalize_drops_non_finite() {
        let mut chroma = [0.0f32; 12];
        chroma[0] = 1.0;
        chroma[1] = f32::NAN;
        chroma[2] = 3.0;
        assert!(normalize(&mut chroma));
        assert_eq!(chroma[1], 0.0);
        assert!((chroma.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hpcp_ema_and_normalization() {
        let mut hpcp = Hpcp::new();
        let mut first = [0.0f32; 12];
        first[0] = 1.0;
        hpcp.update(&first);
        assert!((hpcp.values()[0] - 1.0).abs() < 1e-6);

        let mut second = [0.0f32; 12];
        second[7] = 1.0;
        hpcp.update(&second);
        // 0.8 * C + 0.2 * G, already summing to one.
        assert!((hpcp.values()[0] - 0.8).abs() < 1e-5);
        assert!((hpcp.values()[7] - 0.2).abs() < 1e-5);
        let sum: f32 = hpcp.values().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}
