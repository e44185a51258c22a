// Onset strength extraction driving the tempo tracker.
//
// Spectral flux with band weighting and an adaptive median threshold, or an
// energy-rise fallback on the same thresholding path.

use crate::error::Result;
use crate::fft::SpectrumAnalyzer;
use crate::pcm;
use std::collections::VecDeque;

/// Capacity of the raw-onset ring feeding the adaptive median threshold.
const RAW_RING_CAPACITY: usize = 120;

/// One processed tempo frame.
#[derive(Debug, Clone, Copy)]
pub struct OnsetFrame {
    /// Post-threshold onset strength, non-negative.
    pub onset: f32,
    /// Pre-threshold onset strength.
    pub raw: f32,
    /// Adaptive threshold applied this frame.
    pub threshold: f32,
    /// Frame energy in dB full scale.
    pub energy_db: f32,
}

pub struct OnsetDetector {
    sample_rate: u32,
    frame_size: usize,
    use_spectral_flux: bool,
    onset_sensitivity: f32,
    median_filter_size: usize,
    adaptive_threshold_ratio: f32,
    fft: SpectrumAnalyzer,
    mags: Vec<f64>,
    prev_mags: Vec<f64>,
    has_prev: bool,
    prev_rms: f32,
    raw_ring: VecDeque<f32>,
    median_scratch: Vec<f32>,
}

impl OnsetDetector {
    pub fn new(
        sample_rate: u32,
        frame_size: usize,
        use_spectral_flux: bool,
        onset_sensitivity: f32,
        median_filter_size: usize,
        adaptive_threshold_ratio: f32,
    ) -> Result<Self> {
        let fft = SpectrumAnalyzer::new(frame_size)?;
        Ok(Self {
            sample_rate,
            frame_size,
            use_spectral_flux,
            onset_sensitivity,
            median_filter_size: median_filter_size.max(1),
            adaptive_threshold_ratio,
            fft,
            mags: Vec::with_capacity(frame_size / 2 + 1),
            prev_mags: vec![0.0; frame_size / 2 + 1],
            has_prev: false,
            prev_rms: 0.0,
            raw_ring: VecDeque::with_capacity(RAW_RING_CAPACITY),
            median_scratch: Vec::with_capacity(RAW_RING_CAPACITY),
        })
    }

    pub fn reset(&mut self) {
        self.prev_mags.iter_mut().for_each(|m| *m = 0.0);
        self.has_prev = false;
        self.prev_rms = 0.0;
        self.raw_ring.clear();
    }

    /// Process one non-overlapping tempo frame.
    pub fn process(&mut self, frame: &[f32]) -> OnsetFrame {
        let rms = pcm::rms(frame);
        let energy_db = pcm::energy_db(rms);

        let raw = if self.use_spectral_flux {
            self.spectral_flux(frame)
        } else {
            let rise = (rms - self.prev_rms).max(0.0);
            self.prev_rms = rms;
            rise
        };

        if self.raw_ring.len() >= RAW_RING_CAPACITY {
            self.raw_ring.pop_front();
        }
        self.raw_ring.push_back(raw);

        let threshold = if self.raw_ring.len() >= self.median_filter_size {
            self.ring_median() * self.adaptive_threshold_ratio
        } else {
            0.0
        };

        let onset = (raw - threshold).max(0.0) * self.onset_sensitivity;
        OnsetFrame {
            onset,
            raw,
            threshold,
            energy_db,
        }
    }

    /// Half-wave-rectified, band-weighted magnitude difference against the
    /// previous frame, normalized by the bin count.
    fn spectral_flux(&mut self, frame: &[f32]) -> f32 {
        self.fft.magnitudes(frame, &mut self.mags);
        let half = self.frame_size / 2;
        let bin_hz = f64::from(self.sample_rate) / self.frame_size as f64;

        let mut flux = 0.0f64;
        if self.has_prev {
            for k in 1..=half {
                let diff = (self.mags[k] - self.prev_mags[k]).max(0.0);
                flux += diff * band_weight(k as f64 * bin_hz);
            }
        }
        self.prev_mags.copy_from_slice(&self.mags);
        self.has_prev = true;
        (flux / half as f64) as f32
    }

    fn ring_median(&mut self) -> f32 {
        self.median_scratch.clear();
        self.median_scratch.extend(self.raw_ring.iter().copied());
        self.median_scratch
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.median_scratch[self.median_scratch.len() / 2]
    }
}

/// Percussive low end and melodic mid band contribute more to onsets.
fn band_weight(freq_hz: f64) -> f64 {
    if (60.0..=250.0).contains(&freq_hz) {
        1.5
    } else if (200.0..=900.0).contains(&freq_hz) {
        1.2
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn detector() -> OnsetDetector {
        OnsetDetector::new(48_000, 1024, true, 0.9, 9, 1.7).unwrap()
    }

    fn sine_frame(freq: f32, amp: f32) -> Vec<f32> {
        (0..1024)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / 48_000.0).sin())
            .collect()
    }

    #[test]
    fn test_silence_produces_zero_onset() {
        let mut det = detector();
        for _ in 0..20 {
            let frame = det.process(&vec![0.0; 1024]);
            assert_eq!(frame.onset, 0.0);
            assert_eq!(frame.energy_db, -120.0);
        }
    }

    #[test]
    fn test_attack_after_silence_fires() {
        let mut det = detector();
        // Warm the median ring with silence so the threshold stays near zero.
        for _ in 0..20 {
            det.process(&vec![0.0; 1024]);
        }
        let frame = det.process(&sine_frame(1000.0, 0.6));
        assert!(frame.raw > 0.0);
        assert!(frame.onset > 0.0);
        assert!(frame.energy_db > -65.0);
    }

    #[test]
    fn test_steady_tone_flux_decays() {
        let mut det = detector();
        det.process(&sine_frame(1000.0, 0.6));
        let second = det.process(&sine_frame(1000.0, 0.6));
        // Identical consecutive spectra have no positive flux.
        assert!(second.raw < 1e-3);
    }

    #[test]
    fn test_threshold_engages_after_median_window() {
        let mut det = detector();
        for i in 0..8 {
            let frame = det.process(&sine_frame(500.0 + 50.0 * i as f32, 0.4));
            assert_eq!(frame.threshold, 0.0, "frame {i}");
        }
        // Ninth frame reaches the median filter size.
        let frame = det.process(&sine_frame(950.0, 0.4));
        assert!(frame.threshold >= 0.0);
        assert_eq!(det.raw_ring.len(), 9);
    }

    #[test]
    fn test_energy_rise_fallback() {
        let mut det = OnsetDetector::new(48_000, 1024, false, 0.9, 9, 1.7).unwrap();
        for _ in 0..12 {
            det.process(&vec![0.0; 1024]);
        }
        let frame = det.process(&sine_frame(200.0, 0.5));
        assert!(frame.raw > 0.0);
        assert!(frame.onset > 0.0);
    }

    #[test]
    fn test_band_weight_ranges() {
        assert_eq!(band_weight(100.0), 1.5);
        assert_eq!(band_weight(220.0), 1.5);
        assert_eq!(band_weight(400.0), 1.2);
        assert_eq!(band_weight(2000.0), 1.0);
        assert_eq!(band_weight(30.0), 1.0);
    }
}
