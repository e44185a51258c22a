// Streaming key detection.
//
// Overlapping frames run through spectrum conditioning, tuning estimation
// and chroma extraction into a hybrid learned/classical classifier with
// temporal smoothing, a display lock, and an optional beat-synchronous
// re-estimate driven by an external tempo.

use crate::chroma::{fold_simple, normalize, CqtTable, Hpcp};
use crate::classify::{blend, classical_scores, softmax24, top_three, KeyLabel};
use crate::error::{AnalyzerError, Result};
use crate::fft::SpectrumAnalyzer;
use crate::genre::{GenreModelConfig, GenreRegistry};
use crate::model::{KeyModel, UniformModel};
use crate::pcm;
use crate::smooth::Smoother;
use crate::spectrum::SpectrumConditioner;
use crate::tuning::estimate_tuning_cents;
use std::collections::VecDeque;

/// Conversion from the model's raw tuning regression scalar to cents.
const TUNING_SCALAR_TO_CENTS: f32 = 400.0;

/// Key detector front-end configuration.
#[derive(Clone, Debug)]
pub struct KeyConfig {
    pub sample_rate: u32,
    /// Analysis frame size in samples, power of two (default: 4096).
    pub fft_size: usize,
    /// Frame advance in samples (default: 1024).
    pub hop: usize,
    pub min_hz: f32,
    pub max_hz: f32,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            fft_size: 4096,
            hop: 1024,
            min_hz: 50.0,
            max_hz: 5000.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct DisplayState {
    label: Option<KeyLabel>,
    confidence: f32,
    alternates: Vec<(KeyLabel, f32)>,
    tuning_cents: Option<f32>,
}

pub struct KeyAnalyzer {
    config: KeyConfig,
    genre: GenreModelConfig,
    registry: GenreRegistry,
    bin_hz: f64,
    fft: SpectrumAnalyzer,
    ring: VecDeque<f32>,
    frame: Vec<f32>,
    mags: Vec<f64>,
    conditioner: SpectrumConditioner,
    cqt: Option<CqtTable>,
    hpcp: Hpcp,
    smoother: Smoother,
    model: Box<dyn KeyModel>,
    tuning_cents: Option<f32>,
    last_winner: Option<usize>,
    lock_run: u32,
    display: DisplayState,
    beat_bpm: f32,
    beat_accumulator: [f32; 12],
    beat_elapsed: f32,
    beat_label: Option<KeyLabel>,
    beat_confidence: f32,
}

impl KeyAnalyzer {
    pub fn new(config: KeyConfig, genre: GenreModelConfig) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(AnalyzerError::InvalidSampleRate(config.sample_rate));
        }
        if config.hop == 0 {
            return Err(AnalyzerError::InvalidHopSize(config.hop));
        }
        if config.min_hz >= config.max_hz {
            return Err(AnalyzerError::InvalidFrequencyRange {
                min_hz: config.min_hz,
                max_hz: config.max_hz,
            });
        }
        let fft = SpectrumAnalyzer::new(config.fft_size)?;
        let bin_hz = f64::from(config.sample_rate) / config.fft_size as f64;
        let conditioner = SpectrumConditioner::new(
            genre.whitening_alpha,
            genre.bass_suppression,
            genre.use_hpss,
            bin_hz,
            config.fft_size / 2,
        );
        let smoother = Smoother::new(genre.smoothing_type, genre.smoothing_strength);
        Ok(Self {
            bin_hz,
            fft,
            ring: VecDeque::with_capacity(config.fft_size * 2),
            frame: vec![0.0; config.fft_size],
            mags: Vec::with_capacity(config.fft_size / 2 + 1),
            conditioner,
            cqt: None,
            hpcp: Hpcp::new(),
            smoother,
            model: Box::new(UniformModel),
            tuning_cents: None,
            last_winner: None,
            lock_run: 0,
            display: DisplayState::default(),
            beat_bpm: 0.0,
            beat_accumulator: [0.0; 12],
            beat_elapsed: 0.0,
            beat_label: None,
            beat_confidence: 0.0,
            registry: GenreRegistry::builtin(),
            genre,
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
        self.ring.clear();
        self.conditioner.reset();
        self.cqt = None;
        self.hpcp.reset();
        self.smoother.reset();
        self.tuning_cents = None;
        self.last_winner = None;
        self.lock_run = 0;
        self.display = DisplayState::default();
        self.beat_accumulator = [0.0; 12];
        self.beat_elapsed = 0.0;
        self.beat_label = None;
        self.beat_confidence = 0.0;
    }

    /// Swap in an inference adapter; the uniform fallback applies until a
    /// real model is attached.
    pub fn set_model(&mut self, model: Box<dyn KeyModel>) {
        self.model = model;
    }

    /// Resolve and apply a genre profile. Smoother, conditioner and chroma
    /// tables are rebuilt; the HPCP and display survive.
    pub fn switch_genre(&mut self, genre: &str, subgenre: &str) {
        let resolved = self.registry.resolve(genre, subgenre);
        tracing::info!(genre, subgenre, "switching key detection profile");
        self.apply_genre_config(resolved);
    }

    pub fn set_genre_config(&mut self, config: GenreModelConfig) {
        self.apply_genre_config(config);
    }

    /// External tempo driving the beat-synchronous branch; zero disables it.
    pub fn set_beat_bpm(&mut self, bpm: f32) {
        if bpm > 0.0 && bpm.is_finite() {
            self.beat_bpm = bpm;
        } else {
            self.beat_bpm = 0.0;
            self.beat_accumulator = [0.0; 12];
            self.beat_elapsed = 0.0;
        }
    }

    pub fn registry_mut(&mut self) -> &mut GenreRegistry {
        &mut self.registry
    }

    pub fn genre_config(&self) -> &GenreModelConfig {
        &self.genre
    }

    /// Display-stable key label, `"--"` until the lock has latched.
    pub fn label(&self) -> &'static str {
        self.display.label.map(KeyLabel::name).unwrap_or("--")
    }

    pub fn current_key(&self) -> Option<KeyLabel> {
        self.display.label
    }

    pub fn confidence(&self) -> f32 {
        self.display.confidence
    }

    pub fn top_alternates(&self) -> &[(KeyLabel, f32)] {
        &self.display.alternates
    }

    pub fn hpcp(&self) -> &[f32; 12] {
        self.hpcp.values()
    }

    pub fn tuning_offset(&self) -> Option<f32> {
        self.display.tuning_cents
    }

    pub fn beat_label(&self) -> &'static str {
        self.beat_label.map(KeyLabel::name).unwrap_or("--")
    }

    pub fn beat_key(&self) -> Option<KeyLabel> {
        self.beat_label
    }

    pub fn beat_confidence(&self) -> f32 {
        self.beat_confidence
    }

    fn apply_genre_config(&mut self, config: GenreModelConfig) {
        self.conditioner = SpectrumConditioner::new(
            config.whitening_alpha,
            config.bass_suppression,
            config.use_hpss,
            self.bin_hz,
            self.config.fft_size / 2,
        );
        self.smoother = Smoother::new(config.smoothing_type, config.smoothing_strength);
        self.cqt = None;
        self.genre = config;
    }

    fn push_sample(&mut self, sample: f32) {
        if !sample.is_finite() {
            return;
        }
        self.ring.push_back(sample);
        while self.ring.len() >= self.config.fft_size {
            for (dst, &src) in self
                .frame
                .iter_mut()
                .zip(self.ring.iter().take(self.config.fft_size))
            {
                *dst = src;
            }
            self.process_frame();
            let advance = self.config.hop.min(self.config.fft_size);
            for _ in 0..advance {
                self.ring.pop_front();
            }
        }
    }

    fn process_frame(&mut self) {
        self.fft.magnitudes(&self.frame, &mut self.mags);
        self.conditioner.condition(&mut self.mags);

        if !self.genre.supports_tuning_regression {
            self.tuning_cents = Some(estimate_tuning_cents(&self.mags, self.bin_hz));
        }
        let cents = self.tuning_cents.unwrap_or(0.0);

        let mut instantaneous = if self.genre.hpcp_bins <= 12 {
            fold_simple(
                &self.mags,
                self.bin_hz,
                f64::from(self.config.min_hz),
                f64::from(self.config.max_hz),
                cents,
            )
        } else {
            let half = self.config.fft_size / 2;
            let bins_per_octave = self.genre.hpcp_bins;
            let rebuild = self
                .cqt
                .as_ref()
                .map_or(true, |table| !table.matches(half, bins_per_octave, cents));
            if rebuild {
                self.cqt = Some(CqtTable::build(
                    half,
                    self.bin_hz,
                    f64::from(self.config.min_hz),
                    f64::from(self.config.max_hz),
                    bins_per_octave,
                    cents,
                ));
            }
            match &self.cqt {
                Some(table) => table.project(&self.mags),
                None => [0.0; 12],
            }
        };

        // Silent frames leave all state untouched except the beat clock.
        if !normalize(&mut instantaneous) {
            self.advance_beat_clock(None);
            return;
        }

        self.hpcp.update(&instantaneous);
        self.classify();
        self.advance_beat_clock(Some(&instantaneous));
    }

    fn classify(&mut self) {
        let inference = self.model.infer(self.hpcp.values());
        let logits = inference.map(|out| out.logits).unwrap_or([0.0; 24]);
        let model_probs = softmax24(&logits);
        if self.genre.supports_tuning_regression {
            self.tuning_cents = inference
                .and_then(|out| out.tuning_scalar)
                .map(|scalar| scalar * TUNING_SCALAR_TO_CENTS);
        }

        let smoothed = self.smoother.step(model_probs);
        let combined = if self.genre.use_classical {
            let classical = softmax24(&classical_scores(self.hpcp.values()));
            blend(&smoothed, &classical, self.genre.classical_weight)
        } else {
            smoothed
        };

        let top = top_three(&combined);
        let winner = top[0];
        let confidence = combined[winner];

        if confidence >= self.genre.min_confidence {
            if self.last_winner == Some(winner) {
                self.lock_run = (self.lock_run + 1).min(self.genre.lock_frames.max(1));
            } else {
                self.last_winner = Some(winner);
                self.lock_run = 1;
            }
            // An empty display accepts the first valid estimate at once.
            if self.display.label.is_none() || self.lock_run >= self.genre.lock_frames.max(1) {
                self.display = DisplayState {
                    label: Some(KeyLabel(winner)),
                    confidence,
                    alternates: top
                        .iter()
                        .map(|&idx| (KeyLabel(idx), combined[idx]))
                        .collect(),
                    tuning_cents: self.tuning_cents,
                };
            }
        } else {
            self.lock_run = self.lock_run.saturating_sub(1);
        }
    }

    /// Accumulate instantaneous chroma over one beat and re-estimate from
    /// the learned branch alone, bypassing smoothing and the display lock.
    fn advance_beat_clock(&mut self, instantaneous: Option<&[f32; 12]>) {
        if self.beat_bpm <= 0.0 {
            return;
        }
        if let Some(chroma) = instantaneous {
            for (acc, &value) in self.beat_accumulator.iter_mut().zip(chroma.iter()) {
                *acc += value;
            }
        }
        self.beat_elapsed += self.config.hop as f32 / self.config.sample_rate as f32;

        let beat_period = 60.0 / self.beat_bpm;
        if self.beat_elapsed < beat_period {
            return;
        }

        let mut beat_chroma = self.beat_accumulator;
        if normalize(&mut beat_chroma) {
            let logits = self
                .model
                .infer(&beat_chroma)
                .map(|out| out.logits)
                .unwrap_or([0.0; 24]);
            let probs = softmax24(&logits);
            let winner = top_three(&probs)[0];
            self.beat_label = Some(KeyLabel(winner));
            self.beat_confidence = probs[winner];
        }
        self.beat_accumulator = [0.0; 12];
        self.beat_elapsed -= beat_period;
    }
}
