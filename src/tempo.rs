// Streaming tempo estimation.
//
// Non-overlapping frames feed the onset detector; the onset envelope is
// autocorrelated and tracked through three tempo hypotheses with octave
// promotion, anti-snap correction, adaptive smoothing and a lock/report
// stage.

use crate::acf::AcfMap;
use crate::error::{AnalyzerError, Result};
use crate::onset::OnsetDetector;
use crate::pcm;
use std::collections::VecDeque;

/// Envelope frames required before the first estimate.
const MIN_ENVELOPE_FRAMES: usize = 48;
/// ACF peaks considered per frame.
const TOP_CANDIDATES: usize = 6;
/// Weight of the half-lag support term.
const SUPPORT_HALF: f32 = 0.7;
/// Weight of the double-lag support term.
const SUPPORT_DOUBLE: f32 = 0.5;
/// Score fraction credited to a family-matched hypothesis.
const BLEND_GAIN: f32 = 0.6;
/// Candidates below this BPM are octave-promotion candidates.
const PROMOTE_BELOW_BPM: f32 = 88.0;
/// Candidates above this BPM are octave-demotion candidates.
const DEMOTE_ABOVE_BPM: f32 = 150.0;
const PROMOTE_STRENGTH_RATIO: f32 = 0.75;
const DEMOTE_STRENGTH_RATIO: f32 = 1.25;
/// Known spurious ACF attractors.
const PROBLEM_BPMS: [f32; 2] = [83.5, 103.5];
const SNAP_TOLERANCE: f32 = 0.5;
const SNAP_RUN_LENGTH: u32 = 5;
/// BPM jump that switches the EMA to its fast coefficient.
const EMA_JUMP_BPM: f32 = 6.0;
const EMA_FAST_FACTOR: f32 = 1.8;
const EMA_FAST_CAP: f32 = 0.28;
/// Coefficient-of-variation window for the stability score.
const STABILITY_WINDOW: usize = 16;
const STABILITY_MIN_SAMPLES: usize = 6;
const STABILITY_SHARPNESS: f32 = 18.0;
/// Confidence floor required to enter the locked state.
const LOCK_CONFIDENCE: f32 = 0.60;

/// Tempo estimator configuration.
#[derive(Clone, Debug)]
pub struct TempoConfig {
    pub sample_rate: u32,
    /// Analysis frame size in samples, power of two (default: 1024).
    pub frame_size: usize,
    /// Onset envelope length in seconds (default: 12).
    pub window_seconds: f32,
    /// Baseline EMA coefficient (default: 0.12).
    pub ema_alpha: f32,
    /// Smoothed-BPM history ring length (default: 36).
    pub history_length: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Spectral-flux onsets when true, energy rise otherwise (default: true).
    pub use_spectral_flux: bool,
    pub onset_sensitivity: f32,
    /// Raw-onset samples required before thresholding engages (default: 9).
    pub median_filter_size: usize,
    pub adaptive_threshold_ratio: f32,
    /// Per-frame hypothesis score decay (default: 0.97).
    pub hypothesis_decay: f32,
    /// H2/H1 score ratio that arms the hypothesis swap (default: 1.35).
    pub switch_threshold: f32,
    /// Consecutive frames the ratio must hold (default: 4).
    pub switch_hold_frames: u32,
    pub lock_stability: f32,
    pub unlock_stability: f32,
    pub report_deadband_unlocked: f32,
    pub report_deadband_locked: f32,
    pub report_quant_unlocked: f32,
    pub report_quant_locked: f32,
    /// Frames quieter than this are excluded from estimation (default: -65).
    pub min_energy_db: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_size: 1024,
            window_seconds: 12.0,
            ema_alpha: 0.12,
            history_length: 36,
            min_bpm: 60.0,
            max_bpm: 190.0,
            use_spectral_flux: true,
            onset_sensitivity: 0.9,
            median_filter_size: 9,
            adaptive_threshold_ratio: 1.7,
            hypothesis_decay: 0.97,
            switch_threshold: 1.35,
            switch_hold_frames: 4,
            lock_stability: 0.78,
            unlock_stability: 0.62,
            report_deadband_unlocked: 0.04,
            report_deadband_locked: 0.20,
            report_quant_unlocked: 0.02,
            report_quant_locked: 0.08,
            min_energy_db: -65.0,
        }
    }
}

/// One tracked tempo family.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hypothesis {
    pub bpm: f32,
    pub score: f32,
}

/// Fixed-field frame telemetry.
#[derive(Clone, Copy, Debug, Default)]
pub struct TempoTelemetry {
    pub frames: u64,
    pub env_len: usize,
    pub energy_db: f32,
    pub raw_onset: f32,
    pub threshold: f32,
    pub hypotheses: [Hypothesis; 3],
    pub selected_bpm: f32,
    pub ema_bpm: f32,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    bpm: f32,
    score: f32,
}

pub struct TempoAnalyzer {
    config: TempoConfig,
    frame_duration: f32,
    frames_per_window: usize,
    onset: OnsetDetector,
    ring: Vec<f32>,
    envelope: VecDeque<f32>,
    env_scratch: Vec<f32>,
    hypotheses: [Hypothesis; 3],
    switch_run: u32,
    snap_runs: [u32; 2],
    ema: Option<f32>,
    history: VecDeque<f32>,
    stability: f32,
    confidence: f32,
    locked: bool,
    reported: Option<f32>,
    frames: u64,
    last_energy_db: f32,
    last_raw_onset: f32,
    last_threshold: f32,
    selected: f32,
}

impl TempoAnalyzer {
    pub fn new(config: TempoConfig) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(AnalyzerError::InvalidSampleRate(config.sample_rate));
        }
        if !(config.min_bpm > 0.0 && config.min_bpm < config.max_bpm) {
            return Err(AnalyzerError::InvalidBpmRange {
                min_bpm: config.min_bpm,
                max_bpm: config.max_bpm,
            });
        }
        let onset = OnsetDetector::new(
            config.sample_rate,
            config.frame_size,
            config.use_spectral_flux,
            config.onset_sensitivity,
            config.median_filter_size,
            config.adaptive_threshold_ratio,
        )?;
        let frame_duration = config.frame_size as f32 / config.sample_rate as f32;
        let frames_per_window = ((config.window_seconds * config.sample_rate as f32
            / config.frame_size as f32)
            .round() as usize)
            .max(32);
        Ok(Self {
            frame_duration,
            frames_per_window,
            onset,
            ring: Vec::with_capacity(config.frame_size),
            envelope: VecDeque::with_capacity(frames_per_window),
            env_scratch: Vec::with_capacity(frames_per_window),
            hypotheses: [Hypothesis::default(); 3],
            switch_run: 0,
            snap_runs: [0; 2],
            ema: None,
            history: VecDeque::with_capacity(config.history_length),
            stability: 0.0,
            confidence: 0.0,
            locked: false,
            reported: None,
            frames: 0,
            last_energy_db: -120.0,
            last_raw_onset: 0.0,
            last_threshold: 0.0,
            selected: 0.0,
            config,
        })
    }

    /// Feed interleaved little-endian PCM bytes.
    pub fn add_bytes(&mut self, bytes: &[u8], channels: usize, is_float32: bool) {
        for sample in pcm::decode_mono(bytes, channels, is_float32) {
            self.push_sample(sample);
        }
    }

    /// Feed pre-normalized mono samples.
    pub fn add_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.push_sample(sample);
        }
    }

    pub fn reset(&mut self) {
        self.onset.reset();
        self.ring.clear();
        self.envelope.clear();
        self.hypotheses = [Hypothesis::default(); 3];
        self.switch_run = 0;
        self.snap_runs = [0; 2];
        self.ema = None;
        self.history.clear();
        self.stability = 0.0;
        self.confidence = 0.0;
        self.locked = false;
        self.reported = None;
        self.frames = 0;
        self.last_energy_db = -120.0;
        self.last_raw_onset = 0.0;
        self.last_threshold = 0.0;
        self.selected = 0.0;
    }

    /// Last reported tempo, `None` until an estimate has been produced.
    pub fn bpm(&self) -> Option<f32> {
        self.reported.filter(|&bpm| bpm > 0.0)
    }

    pub fn stability(&self) -> f32 {
        self.stability
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn telemetry(&self) -> TempoTelemetry {
        TempoTelemetry {
            frames: self.frames,
            env_len: self.envelope.len(),
            energy_db: self.last_energy_db,
            raw_onset: self.last_raw_onset,
            threshold: self.last_threshold,
            hypotheses: self.hypotheses,
            selected_bpm: self.selected,
            ema_bpm: self.ema.unwrap_or(0.0),
        }
    }

    fn push_sample(&mut self, sample: f32) {
        if !sample.is_finite() {
            return;
        }
        self.ring.push(sample);
        if self.ring.len() >= self.config.frame_size {
            let frame = std::mem::take(&mut self.ring);
            self.process_frame(&frame);
            self.ring = frame;
            self.ring.clear();
        }
    }

    fn process_frame(&mut self, frame: &[f32]) {
        let onset = self.onset.process(frame);
        self.frames += 1;
        self.last_energy_db = onset.energy_db;
        self.last_raw_onset = onset.raw;
        self.last_threshold = onset.threshold;

        if self.envelope.len() >= self.frames_per_window {
            self.envelope.pop_front();
        }
        self.envelope.push_back(onset.onset);

        // Quiet or short input keeps accumulating without estimating.
        if onset.energy_db < self.config.min_energy_db
            || self.envelope.len() < MIN_ENVELOPE_FRAMES
        {
            return;
        }
        self.estimate();
    }

    fn estimate(&mut self) {
        let n = self.envelope.len();
        let min_lag = ((60.0 * self.config.sample_rate as f32
            / (self.config.frame_size as f32 * self.config.max_bpm))
            .round() as usize)
            .max(2);
        let max_lag = ((60.0 * self.config.sample_rate as f32
            / (self.config.frame_size as f32 * self.config.min_bpm))
            .round() as usize)
            .min(n.saturating_sub(3));
        if max_lag <= min_lag {
            return;
        }

        self.env_scratch.clear();
        self.env_scratch.extend(self.envelope.iter().copied());
        let map = AcfMap::compute(&self.env_scratch, min_lag, max_lag);

        let candidates = self.collect_candidates(&map);
        if candidates.is_empty() {
            return;
        }

        self.update_hypotheses(&candidates);
        self.rerank_and_debounce();

        let s0 = self.hypotheses[0].score;
        let s1 = self.hypotheses[1].score;
        let s2 = self.hypotheses[2].score;
        let total = s0 + s1 + s2;
        self.confidence = if total > 0.0 {
            (s0 / total).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let selected = if self.hypotheses[0].bpm > 0.0 {
            self.hypotheses[0].bpm
        } else {
            candidates[0].bpm
        };

        for hypothesis in &mut self.hypotheses {
            hypothesis.score = (hypothesis.score * self.config.hypothesis_decay).max(0.0);
        }

        let selected = self
            .anti_snap(selected)
            .clamp(self.config.min_bpm, self.config.max_bpm);
        self.selected = selected;

        self.smooth_and_report(selected);
    }

    fn collect_candidates(&self, map: &AcfMap) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(TOP_CANDIDATES);
        for &lag in map.ranked_lags().iter().take(TOP_CANDIDATES) {
            let refined = map.refine_lag(lag);
            if refined <= 0.0 {
                continue;
            }
            let bpm = 60.0 / (refined * self.frame_duration);
            if !bpm.is_finite() {
                continue;
            }
            let mut score = map.get(lag).unwrap_or(0.0);
            let half_lag = (lag as f32 / 2.0).round() as usize;
            if let Some(value) = map.get(half_lag) {
                score += SUPPORT_HALF * value;
            }
            if let Some(value) = map.get(lag * 2) {
                score += SUPPORT_DOUBLE * value;
            }
            if score <= 0.0 {
                continue;
            }
            let bpm = self.promote_octave(map, bpm);
            candidates.push(Candidate { bpm, score });
        }
        candidates
    }

    fn bpm_to_lag(&self, bpm: f32) -> f32 {
        60.0 / (bpm * self.frame_duration)
    }

    /// Octave selection from the ACF map: a slow candidate moves up an
    /// octave when the doubled tempo has comparable ACF strength, a fast
    /// one moves down when the halved tempo is clearly stronger.
    fn promote_octave(&self, map: &AcfMap, bpm: f32) -> f32 {
        let base = map.strength_at(self.bpm_to_lag(bpm));
        if bpm < PROMOTE_BELOW_BPM {
            let doubled = bpm * 2.0;
            if doubled <= self.config.max_bpm
                && map.strength_at(self.bpm_to_lag(doubled)) >= PROMOTE_STRENGTH_RATIO * base
            {
                return doubled;
            }
        }
        if bpm > DEMOTE_ABOVE_BPM {
            let halved = bpm * 0.5;
            if halved >= self.config.min_bpm
                && map.strength_at(self.bpm_to_lag(halved)) >= DEMOTE_STRENGTH_RATIO * base
            {
                return halved;
            }
        }
        bpm
    }

    fn update_hypotheses(&mut self, candidates: &[Candidate]) {
        for candidate in candidates {
            let matched = self
                .hypotheses
                .iter_mut()
                .find(|h| h.bpm > 0.0 && same_family(h.bpm, candidate.bpm));
            match matched {
                Some(hypothesis) => {
                    let total = candidate.score + hypothesis.score;
                    if total > 0.0 {
                        hypothesis.bpm = (candidate.bpm * candidate.score
                            + hypothesis.bpm * hypothesis.score)
                            / total;
                    }
                    hypothesis.score += BLEND_GAIN * candidate.score;
                }
                None => {
                    let weakest = (0..3)
                        .min_by(|&a, &b| {
                            self.hypotheses[a]
                                .score
                                .partial_cmp(&self.hypotheses[b].score)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .unwrap_or(2);
                    self.hypotheses[weakest] = Hypothesis {
                        bpm: candidate.bpm,
                        score: candidate.score,
                    };
                }
            }
        }
    }

    /// H1 is sticky: only H2/H3 re-order freely, and H1 loses the top slot
    /// solely through the debounced swap.
    fn rerank_and_debounce(&mut self) {
        if self.hypotheses[2].score > self.hypotheses[1].score {
            self.hypotheses.swap(1, 2);
        }
        if self.hypotheses[1].score > self.config.switch_threshold * self.hypotheses[0].score {
            self.switch_run += 1;
            if self.switch_run >= self.config.switch_hold_frames {
                tracing::debug!(
                    from = self.hypotheses[0].bpm,
                    to = self.hypotheses[1].bpm,
                    "tempo hypothesis switch"
                );
                self.hypotheses.swap(0, 1);
                self.switch_run = 0;
            }
        } else {
            self.switch_run = 0;
        }
    }

    /// Remap a run of candidates stuck on a known spurious attractor.
    fn anti_snap(&mut self, bpm: f32) -> f32 {
        for (idx, &problem) in PROBLEM_BPMS.iter().enumerate() {
            if (bpm - problem).abs() < SNAP_TOLERANCE {
                self.snap_runs[idx] = (self.snap_runs[idx] + 1).min(SNAP_RUN_LENGTH);
                if self.snap_runs[idx] >= SNAP_RUN_LENGTH {
                    let doubled = problem * 2.0;
                    if doubled <= self.config.max_bpm {
                        return doubled;
                    }
                    let halved = problem * 0.5;
                    if halved >= self.config.min_bpm {
                        return halved;
                    }
                }
            } else {
                self.snap_runs[idx] = 0;
            }
        }
        bpm
    }

    fn smooth_and_report(&mut self, selected: f32) {
        let ema = match self.ema {
            None => selected,
            Some(previous) => {
                let mut alpha = self.config.ema_alpha;
                if (selected - previous).abs() > EMA_JUMP_BPM {
                    alpha = (EMA_FAST_FACTOR * self.config.ema_alpha).min(EMA_FAST_CAP);
                }
                (1.0 - alpha) * previous + alpha * selected
            }
        };
        self.ema = Some(ema);

        if self.history.len() >= self.config.history_length.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(ema);
        self.update_stability();

        if self.locked {
            if self.stability < self.config.unlock_stability {
                self.locked = false;
            }
        } else if self.stability >= self.config.lock_stability
            && self.confidence >= LOCK_CONFIDENCE
        {
            self.locked = true;
        }

        let (quant, deadband) = if self.locked {
            (
                self.config.report_quant_locked,
                self.config.report_deadband_locked,
            )
        } else {
            (
                self.config.report_quant_unlocked,
                self.config.report_deadband_unlocked,
            )
        };
        let quantized = (ema / quant).round() * quant;
        match self.reported {
            None => self.reported = Some(quantized),
            Some(last) => {
                if (quantized - last).abs() >= deadband {
                    self.reported = Some(quantized);
                }
            }
        }
    }

    fn update_stability(&mut self) {
        let len = self.history.len();
        if len < STABILITY_MIN_SAMPLES {
            self.stability = 0.0;
            return;
        }
        let take = len.min(STABILITY_WINDOW);
        let start = len - take;
        let mut mean = 0.0f64;
        for &value in self.history.iter().skip(start) {
            mean += f64::from(value);
        }
        mean /= take as f64;
        if mean <= f64::EPSILON {
            self.stability = 0.0;
            return;
        }
        let mut variance = 0.0f64;
        for &value in self.history.iter().skip(start) {
            let diff = f64::from(value) - mean;
            variance += diff * diff;
        }
        variance /= take as f64;
        let cv = (variance.sqrt() / mean) as f32;
        self.stability = (-STABILITY_SHARPNESS * cv).exp().clamp(0.0, 1.0);
    }
}

/// Two tempos belong to the same family when their ratio sits near 1x, 2x
/// or 3x.
fn same_family(a: f32, b: f32) -> bool {
    if a <= 0.0 || b <= 0.0 {
        return false;
    }
    let ratio = a.max(b) / a.min(b);
    (ratio > 0.98 && ratio < 1.02)
        || (ratio > 1.95 && ratio < 2.05)
        || (ratio > 2.90 && ratio < 3.10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const SAMPLE_RATE: u32 = 48_000;

    /// 12 ms, 1 kHz sine pips at the given tempo.
    fn click_track(bpm: f64, seconds: f64, amplitude: f64) -> Vec<f32> {
        let total = (SAMPLE_RATE as f64 * seconds) as usize;
        let mut samples = vec![0.0f32; total];
        let samples_per_beat = 60.0 / bpm * SAMPLE_RATE as f64;
        let pip_len = (SAMPLE_RATE as f64 * 0.012) as usize;
        let mut position = 0.0f64;
        while (position as usize) < total {
            let start = position as usize;
            for j in 0..pip_len {
                let idx = start + j;
                if idx < total {
                    let t = j as f64 / SAMPLE_RATE as f64;
                    samples[idx] = (amplitude * (2.0 * PI * 1000.0 * t).sin()) as f32;
                }
            }
            position += samples_per_beat;
        }
        samples
    }

    fn int16_bytes(samples: &[f32]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|&s| (((s * 32767.0).clamp(-32768.0, 32767.0)) as i16).to_le_bytes())
            .collect()
    }

    fn analyzer() -> TempoAnalyzer {
        TempoAnalyzer::new(TempoConfig {
            sample_rate: SAMPLE_RATE,
            ..TempoConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(TempoAnalyzer::new(TempoConfig {
            sample_rate: 0,
            ..TempoConfig::default()
        })
        .is_err());
        assert!(TempoAnalyzer::new(TempoConfig {
            frame_size: 1000,
            ..TempoConfig::default()
        })
        .is_err());
        assert!(TempoAnalyzer::new(TempoConfig {
            min_bpm: 190.0,
            max_bpm: 60.0,
            ..TempoConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_metronome_120_bpm() {
        let mut tempo = analyzer();
        let samples = click_track(120.0, 8.0, 0.6);
        tempo.add_bytes(&int16_bytes(&samples), 1, false);

        let bpm = tempo.bpm().expect("tempo should be reported");
        assert!((bpm - 120.0).abs() <= 1.0, "expected ~120 BPM, got {bpm}");
        assert!((0.0..=1.0).contains(&tempo.stability()));
        assert!((0.0..=1.0).contains(&tempo.confidence()));
    }

    #[test]
    fn test_metronome_75_bpm_stays_without_double_support() {
        // Pips only on the beat leave no half-beat ACF energy, so octave
        // promotion must not fire.
        let mut tempo = analyzer();
        tempo.add_samples(&click_track(75.0, 8.0, 0.6));

        let bpm = tempo.bpm().expect("tempo should be reported");
        assert!((bpm - 75.0).abs() <= 1.5, "expected ~75 BPM, got {bpm}");
    }

    #[test]
    fn test_deterministic_for_identical_input() {
        let samples = click_track(75.0, 6.0, 0.6);
        let mut a = analyzer();
        let mut b = analyzer();
        a.add_samples(&samples);
        b.add_samples(&samples);
        assert_eq!(a.bpm(), b.bpm());
        assert_eq!(a.telemetry().env_len, b.telemetry().env_len);
    }

    #[test]
    fn test_silence_reports_none() {
        let mut tempo = analyzer();
        tempo.add_samples(&vec![0.0; SAMPLE_RATE as usize * 6]);
        assert_eq!(tempo.bpm(), None);
        assert_eq!(tempo.stability(), 0.0);
        assert!(!tempo.is_locked());
    }

    #[test]
    fn test_short_envelope_reports_none() {
        // Under 48 frames of envelope (about one second at 48 kHz).
        let mut tempo = analyzer();
        tempo.add_samples(&click_track(120.0, 0.9, 0.6));
        assert_eq!(tempo.bpm(), None);
    }

    #[test]
    fn test_reset_returns_sentinels() {
        let mut tempo = analyzer();
        tempo.add_samples(&click_track(120.0, 6.0, 0.6));
        assert!(tempo.bpm().is_some());

        tempo.reset();
        assert_eq!(tempo.bpm(), None);
        assert_eq!(tempo.stability(), 0.0);
        assert_eq!(tempo.confidence(), 0.0);
        assert!(!tempo.is_locked());
        assert_eq!(tempo.telemetry().env_len, 0);
    }

    #[test]
    fn test_split_feed_matches_single_feed() {
        let samples = click_track(120.0, 6.0, 0.6);
        // Split on a frame boundary.
        let cut = 1024 * 140;

        let mut whole = analyzer();
        whole.add_samples(&samples);

        let mut split = analyzer();
        split.add_samples(&samples[..cut]);
        split.add_samples(&samples[cut..]);

        assert_eq!(whole.bpm(), split.bpm());
        assert_eq!(whole.telemetry().env_len, split.telemetry().env_len);
    }

    #[test]
    fn test_anti_snap_remaps_problem_bpm() {
        let mut tempo = analyzer();
        for _ in 0..4 {
            assert!((tempo.anti_snap(83.6) - 83.6).abs() < 1e-6);
        }
        // Fifth consecutive candidate within tolerance flips the octave.
        assert!((tempo.anti_snap(83.4) - 167.0).abs() < 1e-6);
        // A candidate away from the attractor clears the run.
        assert!((tempo.anti_snap(120.0) - 120.0).abs() < 1e-6);
        assert!((tempo.anti_snap(83.5) - 83.5).abs() < 1e-6);
    }

    #[test]
    fn test_anti_snap_halves_when_double_out_of_range() {
        let mut tempo = TempoAnalyzer::new(TempoConfig {
            sample_rate: SAMPLE_RATE,
            min_bpm: 40.0,
            max_bpm: 160.0,
            ..TempoConfig::default()
        })
        .unwrap();
        for _ in 0..4 {
            tempo.anti_snap(83.5);
        }
        assert!((tempo.anti_snap(83.5) - 41.75).abs() < 1e-6);
    }

    #[test]
    fn test_same_family_ratios() {
        assert!(same_family(120.0, 120.5));
        assert!(same_family(120.0, 240.0));
        assert!(same_family(60.0, 178.0));
        assert!(!same_family(120.0, 150.0));
        assert!(!same_family(120.0, 130.0));
        assert!(!same_family(0.0, 120.0));
    }

    #[test]
    fn test_reported_changes_stay_on_quantization_grid() {
        // Both report grids (0.02 unlocked, 0.08 locked) are multiples of
        // 0.02, so sampled reports either repeat or move by at least one
        // step.
        let mut tempo = analyzer();
        let samples = click_track(120.0, 8.0, 0.6);
        let mut reports = Vec::new();
        for chunk in samples.chunks(4096) {
            tempo.add_samples(chunk);
            if let Some(bpm) = tempo.bpm() {
                reports.push(bpm);
            }
        }
        assert!(!reports.is_empty());
        for pair in reports.windows(2) {
            let delta = (pair[1] - pair[0]).abs();
            assert!(
                delta < 1e-4 || delta >= 0.02 - 1e-4,
                "report moved by {delta}"
            );
        }
    }

    #[test]
    fn test_reported_bpm_within_range() {
        let mut tempo = analyzer();
        tempo.add_samples(&click_track(120.0, 8.0, 0.6));
        let bpm = tempo.bpm().unwrap();
        assert!((60.0..=190.0).contains(&bpm), "bpm {bpm} out of range");
    }
}
