//! Entanglement penalty schedule.

use entangle_common::EntangleConfig;

/// Epoch at which the default ramp reaches its target.
pub const DEFAULT_MAX_EPOCHS: usize = 30;
/// Penalty weight the default ramp reaches at [`DEFAULT_MAX_EPOCHS`].
pub const DEFAULT_MAX_LAMBDA: f64 = 0.05;

/// Linear ramp: `(epoch / max_epochs) · max_lambda`.
///
/// 0 at epoch 0, `max_lambda` at `epoch == max_epochs`, and it keeps growing
/// past `max_epochs`. `max_epochs == 0` is not rejected; the IEEE division
/// hands back `inf` (or `NaN` at epoch 0).
pub fn get_lambda(epoch: usize, max_epochs: usize, max_lambda: f64) -> f64 {
    (epoch as f64 / max_epochs as f64) * max_lambda
}

// ── Lambda Schedule ─────────────────────────────────────────────────────────

/// [`get_lambda`] with its parameters bound.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LambdaSchedule {
    max_epochs: usize,
    max_lambda: f64,
}

impl Default for LambdaSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EPOCHS, DEFAULT_MAX_LAMBDA)
    }
}

impl LambdaSchedule {
    pub fn new(max_epochs: usize, max_lambda: f64) -> Self {
        Self {
            max_epochs,
            max_lambda,
        }
    }

    pub fn from_config(config: &EntangleConfig) -> Self {
        Self::new(config.max_epochs, config.max_lambda)
    }

    pub fn lambda_at(&self, epoch: usize) -> f64 {
        get_lambda(epoch, self.max_epochs, self.max_lambda)
    }

    pub fn max_epochs(&self) -> usize {
        self.max_epochs
    }

    pub fn max_lambda(&self) -> f64 {
        self.max_lambda
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lambda_known_points() {
        assert_eq!(get_lambda(15, 30, 0.05), 0.025);
        assert_eq!(get_lambda(30, 30, 0.05), 0.05);
        assert_eq!(get_lambda(0, 30, 0.05), 0.0);
    }

    #[test]
    fn lambda_endpoints_for_any_horizon() {
        for max_epochs in [1, 7, 30, 1000] {
            for max_lambda in [0.0, 0.05, 1.0, -2.5] {
                assert_eq!(get_lambda(0, max_epochs, max_lambda), 0.0);
                assert!((get_lambda(max_epochs, max_epochs, max_lambda) - max_lambda).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn lambda_monotone_non_decreasing() {
        let mut prev = get_lambda(0, 30, 0.05);
        for epoch in 1..=60 {
            let cur = get_lambda(epoch, 30, 0.05);
            assert!(cur >= prev);
            prev = cur;
        }
    }

    #[test]
    fn lambda_linear_in_epoch() {
        for epoch in 0..=20 {
            let single = get_lambda(epoch, 30, 0.05);
            let double = get_lambda(2 * epoch, 30, 0.05);
            assert!((double - 2.0 * single).abs() < 1e-12);
        }
    }

    #[test]
    fn lambda_not_clamped_past_horizon() {
        assert!((get_lambda(60, 30, 0.05) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn lambda_zero_horizon_is_not_finite() {
        assert!(get_lambda(5, 0, 0.05).is_infinite());
        assert!(get_lambda(0, 0, 0.05).is_nan());
    }

    #[test]
    fn schedule_defaults() {
        let sched = LambdaSchedule::default();
        assert_eq!(sched.max_epochs(), 30);
        assert_eq!(sched.max_lambda(), 0.05);
        assert_eq!(sched.lambda_at(15), 0.025);
    }

    #[test]
    fn schedule_from_config() {
        let config = EntangleConfig {
            max_epochs: 10,
            max_lambda: 0.5,
            ..Default::default()
        };
        let sched = LambdaSchedule::from_config(&config);
        assert!((sched.lambda_at(2) - 0.1).abs() < 1e-12);
    }
}
