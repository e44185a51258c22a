// Learned-model adapter boundary.
//
// The core talks to the inference runtime through this narrow trait and
// degrades to a uniform distribution whenever no model is available.

use crate::error::Result;
use std::path::Path;

/// Raw model output for one chroma observation.
#[derive(Clone, Copy, Debug)]
pub struct ModelOutput {
    /// Unnormalized scores over the 24 key labels; the core applies the
    /// softmax.
    pub logits: [f32; 24],
    /// Raw tuning regression scalar when the model emits one. The core
    /// scales it by 400 to obtain cents.
    pub tuning_scalar: Option<f32>,
}

/// Inference adapter the key detector consumes.
///
/// Implementations own the model file format and runtime; `infer` returns
/// `None` when no usable model is loaded, which the core maps to the
/// uniform fallback.
pub trait KeyModel: Send {
    fn load(&mut self, path: &Path) -> Result<()>;

    fn infer(&mut self, chroma: &[f32; 12]) -> Option<ModelOutput>;
}

/// Fallback adapter used until a real model is attached: never loads
/// anything and always defers to the uniform distribution.
#[derive(Debug, Default)]
pub struct UniformModel;

impl KeyModel for UniformModel {
    fn load(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn infer(&mut self, _chroma: &[f32; 12]) -> Option<ModelOutput> {
        None
    }
}
