// Temporal smoothing of the learned-branch key probabilities.
//
// One polymorphic smoother with four behaviors: pass-through, exponential
// smoothing, an HMM forward step over a key transition matrix, and a
// DBN-style exponentially weighted belief window.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Belief window length of the DBN smoother.
pub const DBN_WINDOW: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingType {
    None,
    Ema,
    Hmm,
    Dbn,
}

/// Key transition weights: strong self-transition, relative and parallel
/// key affinity, small floor everywhere else. Rows are weights, not
/// probabilities; the forward step renormalizes.
pub fn transition_matrix() -> [[f32; 24]; 24] {
    let mut matrix = [[0.01f32; 24]; 24];
    for i in 0..24 {
        matrix[i][i] = 0.7;
        matrix[i][(i + 9) % 24] = 0.08;
        matrix[i][(i + 3) % 24] = 0.08;
        matrix[i][i ^ 1] = 0.1;
    }
    matrix
}

enum SmootherState {
    None,
    Ema {
        strength: f32,
        previous: Option<[f32; 24]>,
    },
    Hmm {
        strength: f32,
        transition: Box<[[f32; 24]; 24]>,
        previous: Option<[f32; 24]>,
    },
    Dbn {
        strength: f32,
        belief: Array2<f32>,
        filled: usize,
    },
}

pub struct Smoother {
    state: SmootherState,
}

impl Smoother {
    pub fn new(kind: SmoothingType, strength: f32) -> Self {
        let strength = strength.clamp(0.0, 1.0);
        let state = match kind {
            SmoothingType::None => SmootherState::None,
            SmoothingType::Ema => SmootherState::Ema {
                strength,
                previous: None,
            },
            SmoothingType::Hmm => SmootherState::Hmm {
                strength,
                transition: Box::new(transition_matrix()),
                previous: None,
            },
            SmoothingType::Dbn => SmootherState::Dbn {
                strength,
                belief: Array2::zeros((24, DBN_WINDOW)),
                filled: 0,
            },
        };
        Self { state }
    }

    pub fn reset(&mut self) {
        match &mut self.state {
            SmootherState::None => {}
            SmootherState::Ema { previous, .. } => *previous = None,
            SmootherState::Hmm { previous, .. } => *previous = None,
            SmootherState::Dbn { belief, filled, .. } => {
                belief.fill(0.0);
                *filled = 0;
            }
        }
    }

    pub fn step(&mut self, probs: [f32; 24]) -> [f32; 24] {
        match &mut self.state {
            SmootherState::None => probs,
            SmootherState::Ema { strength, previous } => {
                let out = match previous {
                    None => probs,
                    Some(prev) => {
                        let mut out = [0.0f32; 24];
                        for i in 0..24 {
                            out[i] = *strength * prev[i] + (1.0 - *strength) * probs[i];
                        }
                        out
                    }
                };
                *previous = Some(out);
                out
            }
            SmootherState::Hmm {
                strength,
                transition,
                previous,
            } => {
                let out = match previous {
                    None => probs,
                    Some(prev) => {
                        let mut forward = [0.0f32; 24];
                        let mut sum = 0.0f32;
                        for i in 0..24 {
                            let mut arrival = 0.0f32;
                            for j in 0..24 {
                                arrival += prev[j] * transition[j][i];
                            }
                            forward[i] = probs[i] * arrival;
                            sum += forward[i];
                        }
                        if sum > 0.0 && sum.is_finite() {
                            for value in forward.iter_mut() {
                                *value /= sum;
                            }
                            let mut out = [0.0f32; 24];
                            for i in 0..24 {
                                out[i] = forward[i] * (1.0 - *strength) + probs[i] * *strength;
                            }
                            out
                        } else {
                            probs
                        }
                    }
                };
                *previous = Some(out);
                out
            }
            SmootherState::Dbn {
                strength,
                belief,
                filled,
            } => {
                // Shift each label window right, newest observation at 0.
                for label in 0..24 {
                    for t in (1..DBN_WINDOW).rev() {
                        belief[[label, t]] = belief[[label, t - 1]];
                    }
                    belief[[label, 0]] = probs[label];
                }
                *filled = (*filled + 1).min(DBN_WINDOW);

                let mut weighted = [0.0f32; 24];
                let mut weight_sum = 0.0f32;
                for t in 0..*filled {
                    weight_sum += (-0.5 * t as f32).exp();
                }
                for label in 0..24 {
                    let mut acc = 0.0f32;
                    for t in 0..*filled {
                        acc += (-0.5 * t as f32).exp() * belief[[label, t]];
                    }
                    weighted[label] = acc / weight_sum;
                }

                let mut out = [0.0f32; 24];
                let mut sum = 0.0f32;
                for i in 0..24 {
                    out[i] = weighted[i] * *strength + probs[i] * (1.0 - *strength);
                    sum += out[i];
                }
                if sum > 0.0 && sum.is_finite() {
                    for value in out.iter_mut() {
                        *value /= sum;
                    }
                    out
                } else {
                    probs
                }
            }
        }
    }
}
