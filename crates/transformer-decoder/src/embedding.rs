//! Token embedding scaled by sqrt(d_model).

use candle_core::{Result, Tensor};
use candle_nn::{Module, VarBuilder};

/// Token embedding lookup.
///
/// The lookup result is multiplied by sqrt(d_model) so that the token signal
/// keeps its magnitude relative to the positional encoding added on top.
#[derive(Debug, Clone)]
pub struct Embedding {
    embedding: candle_nn::Embedding,
    scale: f64,
}

impl Embedding {
    pub fn new(num_classes: usize, d_model: usize, vb: VarBuilder) -> Result<Self> {
        let embedding = candle_nn::embedding(num_classes, d_model, vb)?;
        Ok(Self {
            embedding,
            scale: (d_model as f64).sqrt(),
        })
    }

    /// Forward pass: `[batch, seq_len]` (U32 ids) → `[batch, seq_len, d_model]`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        self.embedding.forward(ids)? * self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_embedding_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let emb = Embedding::new(10, 16, vb).unwrap();

        let ids = Tensor::new(&[[1u32, 2, 3]], &device).unwrap();
        let out = emb.forward(&ids).unwrap();
        assert_eq!(out.dims(), &[1, 3, 16]);
    }
}
