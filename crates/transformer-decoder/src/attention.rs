//! Multi-head scaled dot-product attention.

use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// Multi-head attention with an optional boolean mask.
///
/// Queries, keys and values are projected into `num_heads` independent
/// sub-spaces, scored with scaled dot-product, softmax-normalized and
/// recombined through an output projection. Disallowed positions (mask
/// value 1) receive a large negative score before softmax so their weight
/// vanishes.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
}

impl MultiHeadAttention {
    pub fn new(d_model: usize, num_heads: usize, vb: VarBuilder) -> Result<Self> {
        let head_dim = d_model / num_heads;
        let q_proj = candle_nn::linear(d_model, d_model, vb.pp("q_proj"))?;
        let k_proj = candle_nn::linear(d_model, d_model, vb.pp("k_proj"))?;
        let v_proj = candle_nn::linear(d_model, d_model, vb.pp("v_proj"))?;
        let out_proj = candle_nn::linear(d_model, d_model, vb.pp("out_proj"))?;

        Ok(Self {
            q_proj,
            k_proj,
            v_proj,
            out_proj,
            num_heads,
            head_dim,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `query` - `[batch, q_len, d_model]`
    /// * `key`, `value` - `[batch, k_len, d_model]`
    /// * `mask` - optional `[batch, q_len, k_len]` (U8, 1 = disallowed)
    ///
    /// # Returns
    /// `(output, attn)` - `output` `[batch, q_len, d_model]`,
    /// `attn` `[batch, num_heads, q_len, k_len]`.
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        let (batch_size, q_len, _) = query.dims3()?;
        let k_len = key.dim(1)?;

        let q = self
            .q_proj
            .forward(query)?
            .reshape((batch_size, q_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = self
            .k_proj
            .forward(key)?
            .reshape((batch_size, k_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = self
            .v_proj
            .forward(value)?
            .reshape((batch_size, k_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let scale = (self.head_dim as f64).sqrt();
        let mut scores = (q.matmul(&k.transpose(2, 3)?)? / scale)?;

        if let Some(mask) = mask {
            // [batch, q_len, k_len] -> broadcast across heads
            let mask = mask.unsqueeze(1)?.broadcast_as(scores.shape())?;
            let fill = Tensor::new(-1e9f32, scores.device())?
                .to_dtype(scores.dtype())?
                .broadcast_as(scores.shape())?;
            scores = mask.where_cond(&fill, &scores)?;
        }

        let attn = candle_nn::ops::softmax_last_dim(&scores)?;

        let context = attn
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch_size, q_len, self.num_heads * self.head_dim))?;

        let output = self.out_proj.forward(&context)?;
        Ok((output, attn))
    }
}
