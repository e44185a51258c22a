// Spectrum conditioning ahead of chroma extraction: local whitening,
// harmonic enhancement, optional streaming harmonic/percussive separation,
// and low-frequency suppression.

use ndarray::{Array2, ArrayView1};

/// Frames of spectral history kept for the time-axis median.
const HPSS_TIME_FRAMES: usize = 9;
/// History frames required before masking activates.
const HPSS_MIN_FRAMES: usize = 5;
/// Half-width of the frequency-axis median window (7 bins total).
const HPSS_FREQ_RADIUS: usize = 3;
const EPS: f64 = 1e-9;

pub struct SpectrumConditioner {
    whitening_alpha: f64,
    bass_suppression_hz: f64,
    bin_hz: f64,
    half_len: usize,
    hpss: Option<HpssState>,
    scratch: Vec<f64>,
}

struct HpssState {
    /// Ring of the last enhanced spectra, one row per frame.
    ring: Array2<f64>,
    pos: usize,
    len: usize,
    harmonic_median: Vec<f64>,
    percussive_median: Vec<f64>,
    median_scratch: Vec<f64>,
}

impl HpssState {
    fn new(half_len: usize) -> Self {
        Self {
            ring: Array2::zeros((HPSS_TIME_FRAMES, half_len + 1)),
            pos: 0,
            len: 0,
            harmonic_median: vec![0.0; half_len + 1],
            percussive_median: vec![0.0; half_len + 1],
            median_scratch: Vec::with_capacity(HPSS_TIME_FRAMES.max(2 * HPSS_FREQ_RADIUS + 1)),
        }
    }

    fn push(&mut self, spectrum: &[f64]) {
        self.ring
            .row_mut(self.pos)
            .assign(&ArrayView1::from(spectrum));
        self.pos = (self.pos + 1) % HPSS_TIME_FRAMES;
        self.len = (self.len + 1).min(HPSS_TIME_FRAMES);
    }

    /// Harmonic soft mask `mh / (mh + mp + eps)` per bin, or pass-through
    /// while the history is still warming up.
    fn apply_mask(&mut self, spectrum: &mut [f64]) {
        if self.len < HPSS_MIN_FRAMES {
            return;
        }
        let bins = spectrum.len();
        for k in 1..bins {
            self.median_scratch.clear();
            for t in 0..self.len {
                self.median_scratch.push(self.ring[[t, k]]);
            }
            self.harmonic_median[k] = median(&mut self.median_scratch);
        }
        for k in 1..bins {
            let start = k.saturating_sub(HPSS_FREQ_RADIUS).max(1);
            let end = (k + HPSS_FREQ_RADIUS + 1).min(bins);
            self.median_scratch.clear();
            self.median_scratch.extend_from_slice(&spectrum[start..end]);
            self.percussive_median[k] = median(&mut self.median_scratch);
        }
        for k in 1..bins {
            let mh = self.harmonic_median[k];
            let mp = self.percussive_median[k];
            spectrum[k] *= mh / (mh + mp + EPS);
        }
    }

    fn reset(&mut self) {
        self.ring.fill(0.0);
        self.pos = 0;
        self.len = 0;
    }
}

impl SpectrumConditioner {
    pub fn new(
        whitening_alpha: f32,
        bass_suppression_hz: f32,
        use_hpss: bool,
        bin_hz: f64,
        half_len: usize,
    ) -> Self {
        Self {
            whitening_alpha: f64::from(whitening_alpha),
            bass_suppression_hz: f64::from(bass_suppression_hz),
            bin_hz,
            half_len,
            hpss: use_hpss.then(|| HpssState::new(half_len)),
            scratch: vec![0.0; half_len + 1],
        }
    }

    pub fn reset(&mut self) {
        if let Some(hpss) = &mut self.hpss {
            hpss.reset();
        }
    }

    /// Run the conditioning chain in place over bins `1..half_len`.
    pub fn condition(&mut self, spectrum: &mut [f64]) {
        self.whiten(spectrum);
        self.enhance_harmonics(spectrum);
        if let Some(hpss) = &mut self.hpss {
            hpss.push(spectrum);
            hpss.apply_mask(spectrum);
        }
        self.suppress_bass(spectrum);
    }

    /// Flatten the local spectral envelope: each bin is mixed with itself
    /// divided by its neighborhood mean.
    fn whiten(&mut self, spectrum: &mut [f64]) {
        let alpha = self.whitening_alpha;
        if alpha <= 0.0 {
            return;
        }
        let width = ((5.0 * alpha).round() as usize).clamp(1, 10);
        let bins = self.half_len.min(spectrum.len());
        self.scratch[..spectrum.len()].copy_from_slice(spectrum);
        for k in 1..bins {
            let start = k.saturating_sub(width).max(1);
            let end = (k + width + 1).min(bins);
            let mut mean = 0.0f64;
            for &value in &self.scratch[start..end] {
                mean += value;
            }
            mean /= (end - start) as f64;
            let m = self.scratch[k];
            spectrum[k] = (1.0 - alpha) * m + alpha * m / (mean + EPS);
        }
    }

    /// Fold second and third harmonics back onto the fundamental.
    fn enhance_harmonics(&mut self, spectrum: &mut [f64]) {
        let bins = self.half_len.min(spectrum.len());
        self.scratch[..spectrum.len()].copy_from_slice(spectrum);
        for k in 1..bins {
            let mut enhanced = self.scratch[k];
            if 2 * k < bins {
                enhanced += 0.5 * self.scratch[2 * k];
            }
            if 3 * k < bins {
                enhanced += 0.25 * self.scratch[3 * k];
            }
            spectrum[k] = enhanced;
        }
    }

    /// Quadratic roll-off below the bass cutoff.
    fn suppress_bass(&mut self, spectrum: &mut [f64]) {
        if self.bass_suppression_hz <= 0.0 {
            return;
        }
        let bins = self.half_len.min(spectrum.len());
        for k in 1..bins {
            let freq = k as f64 * self.bin_hz;
            if freq < self.bass_suppression_hz {
                let ratio = freq / self.bass_suppression_hz;
                spectrum[k] *= ratio * ratio;
            }
        }
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[values.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF: usize = 64;
    const BIN_HZ: f64 = 46.875;

    fn flat_spectrum(value: f64) -> Vec<f64> {
        vec![value; HALF + 1]
    }

    #[test]
    fn test_whitening_flattens_peak_contrast() {
        let mut conditioner = SpectrumConditioner::new(0.7, 0.0, false, BIN_HZ, HALF);
        let mut spectrum = flat_spectrum(1.0);
        spectrum[20] = 10.0;
        let before_ratio = spectrum[20] / spectrum[30];
        conditioner.whiten(&mut spectrum);
        let after_ratio = spectrum[20] / spectrum[30];
        assert!(after_ratio < before_ratio);
        assert!(spectrum[20] > spectrum[30]);
    }

    #[test]
    fn test_harmonic_enhancement_adds_overtones() {
        let mut conditioner = SpectrumConditioner::new(0.0, 0.0, false, BIN_HZ, HALF);
        let mut spectrum = flat_spectrum(0.0);
        spectrum[10] = 1.0;
        spectrum[20] = 0.4;
        spectrum[30] = 0.2;
        conditioner.enhance_harmonics(&mut spectrum);
        // 1.0 + 0.5 * 0.4 + 0.25 * 0.2
        assert!((spectrum[10] - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_bass_suppression_quadratic() {
        let mut conditioner = SpectrumConditioner::new(0.0, 120.0, false, BIN_HZ, HALF);
        let mut spectrum = flat_spectrum(1.0);
        conditioner.suppress_bass(&mut spectrum);
        // Bin 1 is ~46.9 Hz, well under the cutoff.
        let expected = (BIN_HZ / 120.0) * (BIN_HZ / 120.0);
        assert!((spectrum[1] - expected).abs() < 1e-9);
        // Above the cutoff nothing changes.
        assert!((spectrum[10] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hpss_passthrough_until_warm() {
        let mut conditioner = SpectrumConditioner::new(0.0, 0.0, true, BIN_HZ, HALF);
        let spectrum = flat_spectrum(1.0);
        for _ in 0..HPSS_MIN_FRAMES - 1 {
            let mut frame = spectrum.clone();
            conditioner.condition(&mut frame);
            // Harmonic enhancement still applies; masking must not.
            assert!(frame[HALF / 2] >= 1.0);
        }
        // Once warm, a steady spectrum is mostly harmonic: mask near
        // mh / (mh + mp) with mh == mp on flat input gives 0.5.
        let mut frame = spectrum.clone();
        conditioner.condition(&mut frame);
        assert!(frame[HALF / 2] < spectrum[HALF / 2] * 2.0);
    }

    #[test]
    fn test_hpss_favors_sustained_tone_over_burst() {
        let mut conditioner = SpectrumConditioner::new(0.0, 0.0, true, BIN_HZ, HALF);
        // Sustained tone at bin 16 for several frames.
        for _ in 0..8 {
            let mut frame = flat_spectrum(0.01);
            frame[16] = 1.0;
            conditioner.condition(&mut frame);
        }
        // A broadband burst frame: the sustained bin keeps most of its
        // energy, the percussive-only bins are masked down.
        let mut burst = flat_spectrum(0.5);
        burst[16] = 1.0;
        conditioner.condition(&mut burst);
        let tone_keep = burst[16];
        let noise_keep = burst[40] / 0.5;
        assert!(
            tone_keep > noise_keep,
            "tone {tone_keep} noise {noise_keep}"
        );
    }

    #[test]
    fn test_median_odd_window() {
        let mut values = vec![3.0, 1.0, 2.0];
        assert_eq!(median(&mut values), 2.0);
        let mut values = vec![5.0];
        assert_eq!(median(&mut values), 5.0);
        assert_eq!(median(&mut []), 0.0);
    }
}
