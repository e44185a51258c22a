/// Cadenza DSP - real-time tempo and key analysis for streaming PCM audio
///
/// Two independent analyzers share the byte-level ingest path:
/// - Tempo: spectral-flux onset detection into a normalized-ACF tracker
///   with triple-hypothesis bookkeeping, octave promotion, anti-snap
///   correction, adaptive smoothing and a lock/report stage
/// - Key: conditioned-spectrum chroma (whitening, harmonic enhancement,
///   optional HPSS, bass suppression, tuning search) into a hybrid
///   learned/classical classifier with temporal smoothing, a display lock
///   and a beat-synchronous re-estimate

// Shared front-end
pub mod error;
pub mod fft;
pub mod pcm;

// Tempo estimation
pub mod acf;
pub mod onset;
pub mod tempo;

// Key detection
pub mod chroma;
pub mod classify;
pub mod genre;
pub mod key;
pub mod model;
pub mod smooth;
pub mod spectrum;
pub mod tuning;

// Re-export the main entry points for convenience
pub use classify::{KeyLabel, KEY_NAMES};
pub use error::{AnalyzerError, Result};
pub use genre::{Genre, GenreModelConfig, GenreRegistry};
pub use key::{KeyAnalyzer, KeyConfig};
pub use model::{KeyModel, ModelOutput, UniformModel};
pub use smooth::SmoothingType;
pub use tempo::{TempoAnalyzer, TempoConfig, TempoTelemetry};
