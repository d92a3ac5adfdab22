//! Trainer: runs two classifiers side by side, each penalised by its KL
//! divergence from the other's predictions.
//!
//! One call to [`EntangledTrainer::step`] runs both forwards, both entangled
//! losses, both backward passes and both AdamW updates. The penalty weight
//! follows the [`LambdaSchedule`] and moves only when [`EntangledTrainer::end_epoch`]
//! is called.

use std::path::{Path, PathBuf};

use anyhow::Context;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};

use entangle_common::EntangleConfig;
use entangle_core::{kl_divergence, Classifier, EntangledLoss, EntangledLossParts, Reduction};

use crate::scheduler::LambdaSchedule;

// ── Metrics ─────────────────────────────────────────────────────────────────

/// Host-side copy of an [`EntangledLossParts`].
#[derive(Debug, Clone, Copy)]
pub struct LossValues {
    pub base: f32,
    pub divergence: f32,
    pub total: f32,
}

impl LossValues {
    fn from_parts(parts: &EntangledLossParts) -> candle_core::Result<Self> {
        Ok(Self {
            base: to_f32(&parts.base)?,
            divergence: to_f32(&parts.divergence)?,
            total: to_f32(&parts.total)?,
        })
    }
}

/// Metrics returned after each training step.
#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub step: usize,
    pub epoch: usize,
    pub lambda: f64,
    pub left: LossValues,
    pub right: LossValues,
}

/// Held-out comparison of the two classifiers.
#[derive(Debug, Clone)]
pub struct EvalMetrics {
    pub left_accuracy: f32,
    pub right_accuracy: f32,
    /// Fraction of rows where both classifiers pick the same class.
    pub agreement: f32,
    /// Mean `KL(left ‖ right)`.
    pub divergence: f32,
}

// ── Trainer ─────────────────────────────────────────────────────────────────

/// One classifier plus the state needed to optimise it.
struct Member {
    model: Classifier,
    varmap: VarMap,
    optimizer: AdamW,
}

impl Member {
    fn new(config: &EntangleConfig, device: &Device) -> anyhow::Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Classifier::new(config, vb)?;
        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.lr,
                weight_decay: config.weight_decay,
                ..Default::default()
            },
        )?;
        Ok(Self {
            model,
            varmap,
            optimizer,
        })
    }
}

/// The entangled training engine. Owns both classifiers, their optimisers
/// and the penalty schedule. Data is supplied by the caller.
pub struct EntangledTrainer {
    left: Member,
    right: Member,
    schedule: LambdaSchedule,
    pub config: EntangleConfig,
    pub global_step: usize,
    pub epoch: usize,
    device: Device,
}

impl EntangledTrainer {
    /// Build both classifiers from config with independent initialisations.
    pub fn new(config: EntangleConfig, device: Device) -> anyhow::Result<Self> {
        let left = Member::new(&config, &device)?;
        let right = Member::new(&config, &device)?;
        let schedule = LambdaSchedule::from_config(&config);

        tracing::info!(
            input_dim = config.input_dim,
            hidden_size = config.hidden_size,
            num_classes = config.num_classes,
            scheduled = config.use_lambda_schedule,
            "Entangled pair initialised"
        );

        Ok(Self {
            left,
            right,
            schedule,
            config,
            global_step: 0,
            epoch: 0,
            device,
        })
    }

    /// Penalty weight for the current epoch.
    pub fn current_lambda(&self) -> f64 {
        if self.config.use_lambda_schedule {
            self.schedule.lambda_at(self.epoch)
        } else {
            self.config.entangle_weight
        }
    }

    /// One optimiser step for each classifier on the batch `(x, y_true)`.
    ///
    /// Each side sees the other's predictions detached, so gradients only
    /// flow into the model being penalised.
    pub fn step(&mut self, x: &Tensor, y_true: &Tensor) -> anyhow::Result<StepMetrics> {
        let lambda = self.current_lambda();
        let (left_parts, right_parts) = self.pair_losses(x, y_true, lambda)?;

        self.left.optimizer.backward_step(&left_parts.total)?;
        self.right.optimizer.backward_step(&right_parts.total)?;

        let metrics = StepMetrics {
            step: self.global_step,
            epoch: self.epoch,
            lambda,
            left: LossValues::from_parts(&left_parts)?,
            right: LossValues::from_parts(&right_parts)?,
        };
        tracing::debug!(
            step = metrics.step,
            lambda = metrics.lambda,
            left_loss = metrics.left.total,
            right_loss = metrics.right.total,
            "step"
        );
        self.global_step += 1;
        Ok(metrics)
    }

    /// Entangled losses of the left and right classifiers. Each side is
    /// compared against the other's detached predictions.
    fn pair_losses(
        &self,
        x: &Tensor,
        y_true: &Tensor,
        lambda: f64,
    ) -> candle_core::Result<(EntangledLossParts, EntangledLossParts)> {
        let loss = EntangledLoss::new().with_weight(lambda);
        let p_left = self.left.model.forward(x)?;
        let p_right = self.right.model.forward(x)?;
        let left_parts = loss.components(y_true, &p_left, &p_right.detach())?;
        let right_parts = loss.components(y_true, &p_right, &p_left.detach())?;
        Ok((left_parts, right_parts))
    }

    /// Close the current epoch; the penalty weight moves to the next point
    /// on the ramp.
    pub fn end_epoch(&mut self) {
        self.epoch += 1;
        tracing::debug!(epoch = self.epoch, lambda = self.current_lambda(), "epoch advanced");
    }

    /// Accuracy of each classifier against `y_true` and how often they agree.
    pub fn evaluate(&self, x: &Tensor, y_true: &Tensor) -> anyhow::Result<EvalMetrics> {
        let labels = y_true.argmax(D::Minus1)?;
        let left_pred = self.left.model.predict(x)?;
        let right_pred = self.right.model.predict(x)?;

        let divergence = kl_divergence(
            &self.left.model.forward(x)?,
            &self.right.model.forward(x)?,
            Reduction::SumOverBatchSize,
        )?;

        Ok(EvalMetrics {
            left_accuracy: match_rate(&left_pred, &labels)?,
            right_accuracy: match_rate(&right_pred, &labels)?,
            agreement: match_rate(&left_pred, &right_pred)?,
            divergence: to_f32(&divergence)?,
        })
    }

    /// Write `left.safetensors`, `right.safetensors` and `config.json` into `dir`.
    pub fn save(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output dir {}", dir.display()))?;
        self.left.varmap.save(dir.join("left.safetensors"))?;
        self.right.varmap.save(dir.join("right.safetensors"))?;
        self.config.save(&dir.join("config.json"))?;
        Ok(dir.to_path_buf())
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn to_f32(t: &Tensor) -> candle_core::Result<f32> {
    t.to_dtype(DType::F32)?.to_scalar::<f32>()
}

/// Fraction of positions where two index tensors are equal.
fn match_rate(a: &Tensor, b: &Tensor) -> candle_core::Result<f32> {
    to_f32(&a.eq(b)?.to_dtype(DType::F32)?.mean_all()?)
}

// ── Tests ───────────────────────────────────────────────────────────────────
