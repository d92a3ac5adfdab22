//! # entangle-train — Entangled Training
//!
//! * **[`get_lambda`]** / **[`LambdaSchedule`]** — linear ramp of the KL
//!   penalty weight over epochs.
//! * **[`EntangledTrainer`]** — owns two classifiers and their optimisers.
//!   One call to [`EntangledTrainer::step`] updates both, each penalised by
//!   its divergence from the other.

pub mod scheduler;
pub mod trainer;

pub use scheduler::{get_lambda, LambdaSchedule, DEFAULT_MAX_EPOCHS, DEFAULT_MAX_LAMBDA};
pub use trainer::{EntangledTrainer, EvalMetrics, LossValues, StepMetrics};
