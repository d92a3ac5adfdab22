//! Entangled loss: a supervised base loss plus a KL penalty that pulls a
//! model's predicted distribution towards another model's.
//!
//! ```text
//! total = base_loss(y_true, y_self) + w · KL(y_self ‖ y_other)
//! ```
//!
//! All inputs are probability tensors with the class axis last, either
//! `(classes,)` or `(batch, classes)`. Nothing is validated: shape or dtype
//! mismatches surface as the `candle_core::Error` raised by the tensor op
//! that trips over them.

use candle_core::{Result, Tensor, D};

/// Fuzz factor used to keep probabilities away from 0 before taking logs.
pub const EPSILON: f64 = 1e-7;

/// Penalty weight used when the caller does not pick one.
pub const DEFAULT_ENTANGLE_WEIGHT: f64 = 0.01;

// ── Reduction ───────────────────────────────────────────────────────────────

/// How per-sample losses are collapsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reduction {
    /// Mean over the batch (scalar).
    #[default]
    SumOverBatchSize,
    /// Sum over the batch (scalar).
    Sum,
    /// Keep one value per sample.
    None,
}

impl Reduction {
    pub fn apply(self, per_sample: &Tensor) -> Result<Tensor> {
        match self {
            Self::SumOverBatchSize => per_sample.mean_all(),
            Self::Sum => per_sample.sum_all(),
            Self::None => Ok(per_sample.clone()),
        }
    }
}

// ── Primitive losses ────────────────────────────────────────────────────────

/// Categorical cross-entropy on probabilities.
///
/// `y_pred` is renormalised along the class axis and clipped to
/// `[EPSILON, 1 - EPSILON]`, then `-Σ y_true · ln(y_pred)` per sample.
pub fn categorical_cross_entropy(
    y_true: &Tensor,
    y_pred: &Tensor,
    reduction: Reduction,
) -> Result<Tensor> {
    let y_pred = y_pred.broadcast_div(&y_pred.sum_keepdim(D::Minus1)?)?;
    let y_pred = y_pred.clamp(EPSILON, 1.0 - EPSILON)?;
    let per_sample = (y_true * y_pred.log()?)?.sum(D::Minus1)?.neg()?;
    reduction.apply(&per_sample)
}

/// Kullback-Leibler divergence `KL(p ‖ q) = Σ p · (ln p − ln q)`.
///
/// Both inputs are clipped to `[EPSILON, 1]`. Identical inputs give exactly 0.
pub fn kl_divergence(p: &Tensor, q: &Tensor, reduction: Reduction) -> Result<Tensor> {
    let p = p.clamp(EPSILON, 1.0)?;
    let q = q.clamp(EPSILON, 1.0)?;
    let log_ratio = (p.log()? - q.log()?)?;
    let per_sample = (&p * log_ratio)?.sum(D::Minus1)?;
    reduction.apply(&per_sample)
}

// ── Pluggable base loss ─────────────────────────────────────────────────────

/// Supervised loss comparing predictions against ground truth.
///
/// Implemented by [`CategoricalCrossEntropy`] and by any
/// `Fn(&Tensor, &Tensor) -> Result<Tensor>` closure.
pub trait BaseLoss {
    fn loss(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor>;
}

impl<F> BaseLoss for F
where
    F: Fn(&Tensor, &Tensor) -> Result<Tensor>,
{
    fn loss(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
        self(y_true, y_pred)
    }
}

/// Default base loss.
#[derive(Clone, Copy, Debug, Default)]
pub struct CategoricalCrossEntropy {
    pub reduction: Reduction,
}

impl BaseLoss for CategoricalCrossEntropy {
    fn loss(&self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor> {
        categorical_cross_entropy(y_true, y_pred, self.reduction)
    }
}

// ── Entangled loss ──────────────────────────────────────────────────────────

/// The two terms of an entangled loss and their weighted sum.
#[derive(Debug, Clone)]
pub struct EntangledLossParts {
    pub base: Tensor,
    /// Unweighted `KL(y_self ‖ y_other)`.
    pub divergence: Tensor,
    pub total: Tensor,
}

fn entangled_parts<L: BaseLoss + ?Sized>(
    base_loss: &L,
    entangle_weight: f64,
    y_true: &Tensor,
    y_pred_self: &Tensor,
    y_pred_other: &Tensor,
) -> Result<EntangledLossParts> {
    let base = base_loss.loss(y_true, y_pred_self)?;
    let divergence = kl_divergence(y_pred_self, y_pred_other, Reduction::SumOverBatchSize)?;
    let total = base.broadcast_add(&divergence.affine(entangle_weight, 0.0)?)?;
    Ok(EntangledLossParts {
        base,
        divergence,
        total,
    })
}

/// `base_loss(y_true, y_pred_self) + entangle_weight · KL(y_pred_self ‖ y_pred_other)`.
///
/// `base_loss_fn = None` selects categorical cross-entropy averaged over the
/// batch. `entangle_weight` is used as given, negative values included.
pub fn compute_entangled_loss(
    y_true: &Tensor,
    y_pred_self: &Tensor,
    y_pred_other: &Tensor,
    base_loss_fn: Option<&dyn BaseLoss>,
    entangle_weight: f64,
) -> Result<Tensor> {
    let default_loss = CategoricalCrossEntropy::default();
    let base_loss = base_loss_fn.unwrap_or(&default_loss);
    let parts = entangled_parts(base_loss, entangle_weight, y_true, y_pred_self, y_pred_other)?;
    Ok(parts.total)
}

/// Reusable entangled loss with a fixed base loss and weight.
#[derive(Clone, Debug)]
pub struct EntangledLoss<L = CategoricalCrossEntropy> {
    base_loss: L,
    entangle_weight: f64,
}

impl Default for EntangledLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl EntangledLoss {
    pub fn new() -> Self {
        Self {
            base_loss: CategoricalCrossEntropy::default(),
            entangle_weight: DEFAULT_ENTANGLE_WEIGHT,
        }
    }
}

impl<L: BaseLoss> EntangledLoss<L> {
    pub fn with_weight(mut self, entangle_weight: f64) -> Self {
        self.entangle_weight = entangle_weight;
        self
    }

    pub fn with_base_loss<M: BaseLoss>(self, base_loss: M) -> EntangledLoss<M> {
        EntangledLoss {
            base_loss,
            entangle_weight: self.entangle_weight,
        }
    }

    pub fn weight(&self) -> f64 {
        self.entangle_weight
    }

    /// Same value as [`compute_entangled_loss`].
    pub fn compute(
        &self,
        y_true: &Tensor,
        y_pred_self: &Tensor,
        y_pred_other: &Tensor,
    ) -> Result<Tensor> {
        Ok(self.components(y_true, y_pred_self, y_pred_other)?.total)
    }

    /// Both terms plus the total, for logging.
    pub fn components(
        &self,
        y_true: &Tensor,
        y_pred_self: &Tensor,
        y_pred_other: &Tensor,
    ) -> Result<EntangledLossParts> {
        entangled_parts(
            &self.base_loss,
            self.entangle_weight,
            y_true,
            y_pred_self,
            y_pred_other,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
