//! Configuration for entangled training.
//!
//! Serialised as JSON. Every field has a sensible default so a minimal `{}`
//! JSON produces a working (if small) pair of classifiers.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Hyper-parameters shared by both classifiers of an entangled pair and by
/// the penalty schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntangleConfig {
    // ── Classifier dimensions ───────────────────────────────────────────────
    /// Number of input features.
    #[serde(default = "default_input_dim")]
    pub input_dim: usize,
    /// Width of the hidden layer.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Number of output classes (size of the probability axis).
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    // ── Entanglement ────────────────────────────────────────────────────────
    /// Fixed KL penalty weight, used when `use_lambda_schedule = false`.
    #[serde(default = "default_entangle_weight")]
    pub entangle_weight: f64,
    /// Ramp the penalty weight linearly with the epoch instead of using
    /// `entangle_weight`.
    #[serde(default = "default_true")]
    pub use_lambda_schedule: bool,
    /// Epoch at which the ramp reaches `max_lambda`.
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,
    /// Penalty weight at `max_epochs`. The ramp keeps growing afterwards.
    #[serde(default = "default_max_lambda")]
    pub max_lambda: f64,

    // ── Optimiser ───────────────────────────────────────────────────────────
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default)]
    pub weight_decay: f64,
}

// ── Default value functions ─────────────────────────────────────────────────

fn default_input_dim() -> usize {
    2
}
fn default_hidden_size() -> usize {
    16
}
fn default_num_classes() -> usize {
    3
}
fn default_entangle_weight() -> f64 {
    0.01
}
fn default_true() -> bool {
    true
}
fn default_max_epochs() -> usize {
    30
}
fn default_max_lambda() -> f64 {
    0.05
}
fn default_lr() -> f64 {
    1e-2
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for EntangleConfig {
    fn default() -> Self {
        Self {
            input_dim: default_input_dim(),
            hidden_size: default_hidden_size(),
            num_classes: default_num_classes(),
            entangle_weight: default_entangle_weight(),
            use_lambda_schedule: true,
            max_epochs: default_max_epochs(),
            max_lambda: default_max_lambda(),
            lr: default_lr(),
            weight_decay: 0.0,
        }
    }
}

impl EntangleConfig {
    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let loaded: EntangleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded.num_classes, 3);
        assert_eq!(loaded.max_epochs, 30);
        assert_eq!(loaded.max_lambda, 0.05);
        assert_eq!(loaded.entangle_weight, 0.01);
        assert!(loaded.use_lambda_schedule);
        assert_eq!(loaded.weight_decay, 0.0);
    }

    #[test]
    fn partial_json_keeps_given_fields() {
        let json = r#"{ "num_classes": 10, "use_lambda_schedule": false, "max_lambda": 0.2 }"#;
        let loaded: EntangleConfig = serde_json::from_str(json).unwrap();
        assert_eq!(loaded.num_classes, 10);
        assert!(!loaded.use_lambda_schedule);
        assert_eq!(loaded.max_lambda, 0.2);
        assert_eq!(loaded.hidden_size, 16);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("entangle-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let config = EntangleConfig {
            input_dim: 7,
            max_epochs: 12,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = EntangleConfig::load(&path).unwrap();
        assert_eq!(loaded.input_dim, 7);
        assert_eq!(loaded.max_epochs, 12);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_errors() {
        let path = std::env::temp_dir().join("entangle-does-not-exist/config.json");
        assert!(EntangleConfig::load(&path).is_err());
    }
}
