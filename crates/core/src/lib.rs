//! # entangle-core — Loss and Model Primitives
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`loss`] | cross-entropy, KL divergence, `compute_entangled_loss`, `EntangledLoss` |
//! | [`model`] | `Classifier` (softmax MLP, one half of an entangled pair) |
//!
//! Everything goes through `candle-core`/`candle-nn` and returns
//! `candle_core::Result`; tensor errors propagate unchanged.

pub mod loss;
pub mod model;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use loss::{
    categorical_cross_entropy, compute_entangled_loss, kl_divergence, BaseLoss,
    CategoricalCrossEntropy, EntangledLoss, EntangledLossParts, Reduction,
    DEFAULT_ENTANGLE_WEIGHT, EPSILON,
};
pub use model::Classifier;
