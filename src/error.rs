use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("FFT size must be a power of two >= 16, got {0}")]
    InvalidFftSize(usize),

    #[error("Hop size must be positive, got {0}")]
    InvalidHopSize(usize),

    #[error("Invalid frequency range: {min_hz} Hz >= {max_hz} Hz")]
    InvalidFrequencyRange { min_hz: f32, max_hz: f32 },

    #[error("Invalid BPM range: {min_bpm} >= {max_bpm}")]
    InvalidBpmRange { min_bpm: f32, max_bpm: f32 },

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Invalid genre override: {0}")]
    GenreOverride(String),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
