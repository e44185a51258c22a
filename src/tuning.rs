// Fine tuning estimation: grid search over reference-pitch offsets in
// cents, scoring how well spectral energy aligns to the semitone grid.

use rayon::prelude::*;

const CENTS_RANGE: i32 = 50;
/// Gaussian width of the semitone alignment score, in semitones.
const ALIGN_SIGMA: f64 = 0.18;
const MIN_HZ: f64 = 40.0;
const MAX_HZ: f64 = 6000.0;

/// Search `[-50, +50]` cents at 1-cent steps for the reference offset that
/// best aligns the spectrum to the semitone grid. A signal tuned sharp by
/// `c` cents scores highest at `+c`.
pub fn estimate_tuning_cents(spectrum: &[f64], bin_hz: f64) -> f32 {
    if spectrum.is_empty() || bin_hz <= 0.0 {
        return 0.0;
    }
    let k_min = ((MIN_HZ / bin_hz).ceil() as usize).max(1);
    let k_max = ((MAX_HZ / bin_hz).floor() as usize).min(spectrum.len().saturating_sub(1));
    if k_max < k_min {
        return 0.0;
    }

    // Each candidate offset is scored independently; the map preserves
    // candidate order so the result is deterministic.
    let scores: Vec<f64> = (-CENTS_RANGE..=CENTS_RANGE)
        .into_par_iter()
        .map(|cents| {
            let mut score = 0.0f64;
            for k in k_min..=k_max {
                let magnitude = spectrum[k];
                if magnitude <= 0.0 {
                    continue;
                }
                let freq = k as f64 * bin_hz;
                let midi = 69.0 + 12.0 * (freq / 440.0).log2() - f64::from(cents) / 100.0;
                let dist = (midi - midi.round()).abs();
                score += magnitude * (-0.5 * (dist / ALIGN_SIGMA).powi(2)).exp();
            }
            score
        })
        .collect();

    let mut best = 0usize;
    for (idx, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = idx;
        }
    }
    if scores[best] <= 0.0 {
        return 0.0;
    }
    (best as i32 - CENTS_RANGE) as f32
}
