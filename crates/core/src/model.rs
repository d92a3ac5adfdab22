//! Probability-emitting classifier used as one half of an entangled pair.
//!
//! ```text
//! x → Linear(input_dim, hidden) → ReLU → Linear(hidden, classes) → softmax
//! ```

use candle_core::{Result, Tensor, D};
use candle_nn::{linear, ops, Linear, Module, VarBuilder};

use entangle_common::EntangleConfig;

pub struct Classifier {
    hidden: Linear,
    out: Linear,
}

impl Classifier {
    /// Construct from config. `vb` should be scoped to the model prefix.
    pub fn new(config: &EntangleConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = linear(config.input_dim, config.hidden_size, vb.pp("hidden"))?;
        let out = linear(config.hidden_size, config.num_classes, vb.pp("out"))?;
        Ok(Self { hidden, out })
    }

    /// Unnormalised class scores, `(batch, classes)`.
    pub fn logits(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.hidden.forward(x)?.relu()?;
        self.out.forward(&h)
    }

    /// Class probabilities; each row sums to 1.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        ops::softmax(&self.logits(x)?, D::Minus1)
    }

    /// Index of the most probable class per row (`u32`).
    pub fn predict(&self, x: &Tensor) -> Result<Tensor> {
        self.logits(x)?.argmax(D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn classifier() -> (Classifier, VarMap) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = EntangleConfig {
            input_dim: 4,
            hidden_size: 8,
            num_classes: 5,
            ..Default::default()
        };
        (Classifier::new(&config, vb).unwrap(), varmap)
    }

    #[test]
    fn forward_rows_are_distributions() {
        let (model, _varmap) = classifier();
        let x = Tensor::randn(0f32, 1.0, (6, 4), &Device::Cpu).unwrap();
        let p = model.forward(&x).unwrap();
        assert_eq!(p.dims(), &[6, 5]);
        let sums: Vec<f32> = p.sum(D::Minus1).unwrap().to_vec1().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn predict_is_argmax_of_forward() {
        let (model, _varmap) = classifier();
        let x = Tensor::randn(0f32, 1.0, (3, 4), &Device::Cpu).unwrap();
        let a: Vec<u32> = model.predict(&x).unwrap().to_vec1().unwrap();
        let b: Vec<u32> = model
            .forward(&x)
            .unwrap()
            .argmax(D::Minus1)
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn registers_both_layers() {
        let (_model, varmap) = classifier();
        // weight + bias per layer
        assert_eq!(varmap.all_vars().len(), 4);
    }
}
