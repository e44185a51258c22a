// Windowed FFT front-end shared by the onset detector and the key pipeline.

use crate::error::{AnalyzerError, Result};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Forward transform of Hann-windowed real frames into magnitude spectra.
///
/// The plan is created once per analyzer and processed in place over a
/// pre-allocated buffer.
pub struct SpectrumAnalyzer {
    size: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    buf: Vec<Complex<f64>>,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Result<Self> {
        if size < 16 || !size.is_power_of_two() {
            return Err(AnalyzerError::InvalidFftSize(size));
        }
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Ok(Self {
            size,
            window: hann_window(size),
            fft,
            buf: vec![Complex { re: 0.0, im: 0.0 }; size],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn half_len(&self) -> usize {
        self.size / 2
    }

    /// Window `frame`, transform, and write `|X_k|` for `k` in `0..=size/2`
    /// into `out`. Non-finite magnitudes are dropped to zero.
    pub fn magnitudes(&mut self, frame: &[f32], out: &mut Vec<f64>) {
        let n = self.size;
        for i in 0..n {
            let s = f64::from(frame.get(i).copied().unwrap_or(0.0));
            self.buf[i] = Complex {
                re: s * self.window[i],
                im: 0.0,
            };
        }
        self.fft.process(&mut self.buf);

        out.clear();
        out.extend(self.buf[..=n / 2].iter().map(|c| {
            let m = c.norm();
            if m.is_finite() {
                m
            } else {
                0.0
            }
        }));
    }
}

/// Generate a Hann window of the given size.
pub fn hann_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * i as f64 / (n as f64 - 1.0);
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}
