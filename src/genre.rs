// Genre-specific key detection profiles.
//
// A registry maps genre and subgenre names to resolved model
// configurations; JSON overrides can replace or extend the built-in
// presets. The analyzer core only ever sees the resolved config.

use crate::smooth::SmoothingType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resolved key-detector configuration for one genre/subgenre.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenreModelConfig {
    /// Spectrum whitening mix (default: 0.7).
    pub whitening_alpha: f32,
    /// Low-frequency cutoff in Hz (default: 120).
    pub bass_suppression: f32,
    /// Chroma resolution; above 12 selects the CQT path (default: 36).
    pub hpcp_bins: usize,
    pub smoothing_type: SmoothingType,
    pub smoothing_strength: f32,
    /// Whether the learned model regresses the tuning offset itself.
    pub supports_tuning_regression: bool,
    /// Confidence needed before the display lock counts agreement.
    pub min_confidence: f32,
    /// Consecutive agreeing frames needed to latch the display.
    pub lock_frames: u32,
    /// Blend the Krumhansl-Schmuckler branch into the result.
    pub use_classical: bool,
    pub classical_weight: f32,
    pub use_hpss: bool,
}

impl Default for GenreModelConfig {
    fn default() -> Self {
        Self {
            whitening_alpha: 0.7,
            bass_suppression: 120.0,
            hpcp_bins: 36,
            smoothing_type: SmoothingType::Hmm,
            smoothing_strength: 0.5,
            supports_tuning_regression: false,
            min_confidence: 0.6,
            lock_frames: 3,
            use_classical: true,
            classical_weight: 0.3,
            use_hpss: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Genre {
    Electronic,
    HipHop,
    Rock,
    Pop,
    Jazz,
    Classical,
    Ambient,
}

impl Genre {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "electronic" => Some(Self::Electronic),
            "hiphop" | "hip-hop" | "hip hop" => Some(Self::HipHop),
            "rock" => Some(Self::Rock),
            "pop" => Some(Self::Pop),
            "jazz" => Some(Self::Jazz),
            "classical" => Some(Self::Classical),
            "ambient" => Some(Self::Ambient),
            _ => None,
        }
    }
}

struct GenreEntry {
    base: GenreModelConfig,
    subgenres: HashMap<String, GenreModelConfig>,
}

/// Built-in presets plus JSON overrides; unknown genre names in overrides
/// are skipped silently.
pub struct GenreRegistry {
    defaults: GenreModelConfig,
    genres: HashMap<Genre, GenreEntry>,
}

impl GenreRegistry {
    pub fn builtin() -> Self {
        let defaults = GenreModelConfig::default();
        let mut genres = HashMap::new();

        let electronic = GenreModelConfig {
            bass_suppression: 150.0,
            use_hpss: true,
            smoothing_type: SmoothingType::Ema,
            smoothing_strength: 0.6,
            ..defaults.clone()
        };
        let mut electronic_subs = HashMap::new();
        electronic_subs.insert(
            "house".to_string(),
            GenreModelConfig {
                lock_frames: 4,
                ..electronic.clone()
            },
        );
        electronic_subs.insert(
            "techno".to_string(),
            GenreModelConfig {
                bass_suppression: 180.0,
                classical_weight: 0.2,
                ..electronic.clone()
            },
        );
        genres.insert(
            Genre::Electronic,
            GenreEntry {
                base: electronic,
                subgenres: electronic_subs,
            },
        );

        genres.insert(
            Genre::HipHop,
            GenreEntry {
                base: GenreModelConfig {
                    bass_suppression: 160.0,
                    use_hpss: true,
                    ..defaults.clone()
                },
                subgenres: HashMap::new(),
            },
        );

        genres.insert(
            Genre::Classical,
            GenreEntry {
                base: GenreModelConfig {
                    smoothing_type: SmoothingType::Dbn,
                    smoothing_strength: 0.7,
                    classical_weight: 0.5,
                    bass_suppression: 80.0,
                    ..defaults.clone()
                },
                subgenres: HashMap::new(),
            },
        );

        genres.insert(
            Genre::Jazz,
            GenreEntry {
                base: GenreModelConfig {
                    smoothing_strength: 0.4,
                    lock_frames: 5,
                    ..defaults.clone()
                },
                subgenres: HashMap::new(),
            },
        );

        genres.insert(
            Genre::Ambient,
            GenreEntry {
                base: GenreModelConfig {
                    smoothing_type: SmoothingType::Dbn,
                    bass_suppression: 60.0,
                    ..defaults.clone()
                },
                subgenres: HashMap::new(),
            },
        );

        Self { defaults, genres }
    }

    /// Look up a configuration; unknown genres fall back to the defaults,
    /// unknown subgenres to the genre base.
    pub fn resolve(&self, genre: &str, subgenre: &str) -> GenreModelConfig {
        let Some(genre) = Genre::from_name(genre) else {
            return self.defaults.clone();
        };
        let Some(entry) = self.genres.get(&genre) else {
            return self.defaults.clone();
        };
        entry
            .subgenres
            .get(&subgenre.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| entry.base.clone())
    }

    /// Merge custom overrides from a JSON mapping of
    /// `genre -> subgenre -> config`. A subgenre key of `"default"`
    /// replaces the genre base. Entries with unknown genre names or
    /// unparseable configs are skipped silently; the number of applied
    /// entries is returned.
    pub fn apply_overrides(&mut self, json: &str) -> crate::error::Result<usize> {
        let parsed: HashMap<String, HashMap<String, serde_json::Value>> =
            serde_json::from_str(json)
                .map_err(|e| crate::error::AnalyzerError::GenreOverride(e.to_string()))?;

        let mut applied = 0usize;
        for (genre_name, subgenres) in parsed {
            let Some(genre) = Genre::from_name(&genre_name) else {
                tracing::debug!(genre = %genre_name, "skipping unknown genre override");
                continue;
            };
            let entry = self.genres.entry(genre).or_insert_with(|| GenreEntry {
                base: self.defaults.clone(),
                subgenres: HashMap::new(),
            });
            for (subgenre, value) in subgenres {
                let config: GenreModelConfig = match serde_json::from_value(value) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::debug!(
                            genre = %genre_name,
                            subgenre = %subgenre,
                            error = %e,
                            "skipping unparseable genre override"
                        );
                        continue;
                    }
                };
                if subgenre.eq_ignore_ascii_case("default") {
                    entry.base = config;
                } else {
                    entry.subgenres.insert(subgenre.to_ascii_lowercase(), config);
                }
                applied += 1;
            }
        }
        Ok(applied)
    }
}

impl Default for GenreRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
