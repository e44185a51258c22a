// Key classification: Krumhansl-Schmuckler template scoring of the HPCP,
// softmax normalization, and blending with the learned-model branch.

use crate::chroma::PITCH_CLASSES;

/// Krumhansl-Schmuckler major key profile, index 0 = tonic.
pub const KS_MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor key profile, index 0 = tonic.
pub const KS_MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// The 24 key labels: even indices are major, odd are minor, interleaved by
/// pitch class.
pub const KEY_NAMES: [&str; 24] = [
    "C major", "C minor", "C# major", "C# minor", "D major", "D minor", "D# major", "D# minor",
    "E major", "E minor", "F major", "F minor", "F# major", "F# minor", "G major", "G minor",
    "G# major", "G# minor", "A major", "A minor", "A# major", "A# minor", "B major", "B minor",
];

/// Camelot wheel codes per pitch class.
const MAJOR_CAMELOT: [&str; 12] = [
    "8B", "3B", "10B", "5B", "12B", "7B", "2B", "9B", "4B", "11B", "6B", "1B",
];
const MINOR_CAMELOT: [&str; 12] = [
    "5A", "12A", "7A", "2A", "9A", "4A", "11A", "6A", "1A", "8A", "3A", "10A",
];

/// Index into the 24-label key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyLabel(pub usize);

impl KeyLabel {
    pub fn name(self) -> &'static str {
        KEY_NAMES[self.0 % 24]
    }

    pub fn pitch_class(self) -> usize {
        (self.0 % 24) / 2
    }

    pub fn is_major(self) -> bool {
        self.0 % 2 == 0
    }

    pub fn pitch_class_name(self) -> &'static str {
        PITCH_CLASSES[self.pitch_class()]
    }

    /// Camelot wheel code for harmonic mixing displays.
    pub fn camelot(self) -> &'static str {
        if self.is_major() {
            MAJOR_CAMELOT[self.pitch_class()]
        } else {
            MINOR_CAMELOT[self.pitch_class()]
        }
    }
}

/// Score the HPCP against all 24 rotated Krumhansl-Schmuckler profiles.
///
/// `scores[2r]` is the major key with tonic `r`, `scores[2r + 1]` the
/// minor one. Each score is the template dot product normalized by the
/// template magnitude.
pub fn classical_scores(hpcp: &[f32; 12]) -> [f32; 24] {
    let major_norm = profile_norm(&KS_MAJOR_PROFILE);
    let minor_norm = profile_norm(&KS_MINOR_PROFILE);
    let mut scores = [0.0f32; 24];
    for root in 0..12 {
        let mut major = 0.0f32;
        let mut minor = 0.0f32;
        for i in 0..12 {
            let value = hpcp[(i + root) % 12];
            major += value * KS_MAJOR_PROFILE[i];
            minor += value * KS_MINOR_PROFILE[i];
        }
        scores[2 * root] = major / major_norm;
        scores[2 * root + 1] = minor / minor_norm;
    }
    scores
}

fn profile_norm(profile: &[f32; 12]) -> f32 {
    let sum: f32 = profile.iter().map(|&p| p * p).sum();
    sum.sqrt().max(1e-9)
}

/// Stable softmax over 24 scores; degenerate inputs fall back to uniform.
pub fn softmax24(scores: &[f32; 24]) -> [f32; 24] {
    let max = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return [1.0 / 24.0; 24];
    }
    let mut probs = [0.0f32; 24];
    let mut sum = 0.0f32;
    for (prob, &score) in probs.iter_mut().zip(scores.iter()) {
        let e = if score.is_finite() {
            (score - max).exp()
        } else {
            0.0
        };
        *prob = e;
        sum += e;
    }
    if sum <= 0.0 || !sum.is_finite() {
        return [1.0 / 24.0; 24];
    }
    for prob in probs.iter_mut() {
        *prob /= sum;
    }
    probs
}

/// Mix the smoothed learned-branch probabilities with the classical
/// branch and renormalize.
pub fn blend(model: &[f32; 24], classical: &[f32; 24], classical_weight: f32) -> [f32; 24] {
    let w = classical_weight.clamp(0.0, 1.0);
    let mut combined = [0.0f32; 24];
    let mut sum = 0.0f32;
    for i in 0..24 {
        combined[i] = ((1.0 - w) * model[i] + w * classical[i]).max(0.0);
        sum += combined[i];
    }
    if sum <= 0.0 || !sum.is_finite() {
        return [1.0 / 24.0; 24];
    }
    for value in combined.iter_mut() {
        *value /= sum;
    }
    combined
}

/// Indices of the three highest probabilities, descending; ties resolve to
/// the lower index.
pub fn top_three(probs: &[f32; 24]) -> [usize; 3] {
    let mut indices: Vec<usize> = (0..24).collect();
    indices.sort_by(|&a, &b| {
        probs[b]
            .partial_cmp(&probs[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    [indices[0], indices[1], indices[2]]
}
