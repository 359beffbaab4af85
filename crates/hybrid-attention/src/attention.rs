//! Location-aware multi-head attention.
//!
//! Combines the content term of multi-head attention with a location term
//! derived from the previous timestep's alignment. The alignment map is run
//! through a 1-D convolution over the head axis, projected into the per-head
//! key space, and fused with the projected query and value before softmax.

use candle_core::{D, Result, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Linear, Module, VarBuilder};

use stt_core::{SttError, SttResult};

use crate::config::HybridAttentionConfig;

fn dims3_named(t: &Tensor, name: &str, expect: &str) -> SttResult<(usize, usize, usize)> {
    t.dims3().map_err(|_| {
        SttError::Shape(format!(
            "{name} must be {expect}, got shape {:?}",
            t.dims()
        ))
    })
}

/// Convolutional location energy.
///
/// Runs a kernel-size-3 convolution over the combined per-head alignment of
/// the previous step, projects the result into the per-head key space and
/// applies tanh. The convolution consumes all heads at once and produces one
/// shared location signal per batch element, which is then replicated along
/// the head axis.
#[derive(Debug, Clone)]
pub struct LocationEnergy {
    conv1d: Conv1d,
    loc_proj: Linear,
    num_heads: usize,
    dim: usize,
}

impl LocationEnergy {
    pub fn new(config: &HybridAttentionConfig, vb: VarBuilder) -> Result<Self> {
        let conv_cfg = Conv1dConfig {
            padding: 1,
            ..Default::default()
        };
        let conv1d = candle_nn::conv1d(
            config.num_heads,
            config.conv_out_channel,
            3,
            conv_cfg,
            vb.pp("conv1d"),
        )?;
        let loc_proj = candle_nn::linear_no_bias(
            config.conv_out_channel,
            config.head_dim(),
            vb.pp("loc_proj"),
        )?;
        Ok(Self {
            conv1d,
            loc_proj,
            num_heads: config.num_heads,
            dim: config.head_dim(),
        })
    }

    /// Forward pass: `[batch, num_heads, v_len]` → `[batch * num_heads, v_len, dim]`.
    ///
    /// Kernel size 3 with padding 1 preserves `v_len`.
    pub fn forward(&self, prev_align: &Tensor) -> Result<Tensor> {
        let (batch_size, _, v_len) = prev_align.dims3()?;

        // Conv over the head axis: [batch, heads, v_len] -> [batch, conv_out, v_len]
        let energy = self.conv1d.forward(prev_align)?;
        let energy = energy.transpose(1, 2)?.contiguous()?; // [batch, v_len, conv_out]
        let energy = self.loc_proj.forward(&energy)?.tanh()?; // [batch, v_len, dim]

        // Replicate the shared signal along the head axis before flattening.
        energy
            .unsqueeze(1)?
            .expand((batch_size, self.num_heads, v_len, self.dim))?
            .contiguous()?
            .reshape((batch_size * self.num_heads, v_len, self.dim))
    }
}

/// Score fusion: energy = tanh(value + query + location + bias), reduced to a
/// scalar per position, softmax-normalized over the position axis.
///
/// The learned bias is shared across heads and positions. It is initialized
/// uniformly in [-0.1, 0.1].
#[derive(Debug, Clone)]
pub struct ScoreFusion {
    score_proj: Linear,
    bias: Tensor,
}

impl ScoreFusion {
    pub fn new(config: &HybridAttentionConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.head_dim();
        let score_proj = candle_nn::linear(dim, 1, vb.pp("score_proj"))?;
        let bias = vb.get_with_hints(
            dim,
            "bias",
            candle_nn::Init::Uniform { lo: -0.1, up: 0.1 },
        )?;
        Ok(Self { score_proj, bias })
    }

    /// Fuse the three energy terms and normalize.
    ///
    /// # Arguments
    /// * `query` - `[batch * num_heads, 1, dim]`
    /// * `value` - `[batch * num_heads, v_len, dim]`
    /// * `loc_energy` - `[batch * num_heads, v_len, dim]`
    ///
    /// # Returns
    /// Alignment `[batch * num_heads, v_len]`; rows are non-negative and sum to 1.
    pub fn forward(&self, query: &Tensor, value: &Tensor, loc_energy: &Tensor) -> Result<Tensor> {
        let energy = value
            .broadcast_add(query)?
            .add(loc_energy)?
            .broadcast_add(&self.bias)?
            .tanh()?;
        let score = self.score_proj.forward(&energy)?.squeeze(D::Minus1)?;
        candle_nn::ops::softmax_last_dim(&score)
    }
}

/// Multi-head location-aware (hybrid) attention.
///
/// Applies multi-head content scoring combined with a location-aware term on
/// the decoder output features, as used in hybrid attention-based speech
/// recognition.
///
/// Inputs: `query` `[batch, 1, hidden_dim]` (one decoding step per call),
/// `value` `[batch, v_len, hidden_dim]`, and the previous step's alignment
/// `[batch, num_heads, v_len]` (or `None` on the first step, which is
/// equivalent to an all-zero alignment).
///
/// Returns `(output, align)` where `output` has the shape of `query` and
/// `align` `[batch, num_heads, v_len]` is threaded into the next call.
///
/// The module holds no per-call mutable state: parameters are read-only
/// during the forward pass and the alignment is owned by the caller, so
/// concurrent forward calls on one instance are safe.
#[derive(Debug, Clone)]
pub struct LocationAwareAttention {
    q_proj: Linear,
    v_proj: Linear,
    location: LocationEnergy,
    fusion: ScoreFusion,
    output_proj: Linear,
    hidden_dim: usize,
    num_heads: usize,
    dim: usize,
}

impl LocationAwareAttention {
    /// Build the module, creating parameters through `vb`.
    ///
    /// Fails immediately with `SttError::Config` on invalid hyperparameters.
    pub fn new(config: &HybridAttentionConfig, vb: VarBuilder) -> SttResult<Self> {
        config.validate()?;
        let hidden_dim = config.hidden_dim;
        let dim = config.head_dim();
        let q_proj =
            candle_nn::linear_no_bias(hidden_dim, dim * config.num_heads, vb.pp("q_proj"))?;
        let v_proj =
            candle_nn::linear_no_bias(hidden_dim, dim * config.num_heads, vb.pp("v_proj"))?;
        let location = LocationEnergy::new(config, vb.clone())?;
        let fusion = ScoreFusion::new(config, vb.clone())?;
        let output_proj = candle_nn::linear(hidden_dim * 2, hidden_dim, vb.pp("output_proj"))?;

        Ok(Self {
            q_proj,
            v_proj,
            location,
            fusion,
            output_proj,
            hidden_dim,
            num_heads: config.num_heads,
            dim,
        })
    }

    /// Attend over `value` with `query`, carrying the previous alignment.
    ///
    /// # Arguments
    /// * `query` - decoder output features, `[batch, 1, hidden_dim]`.
    /// * `value` - encoder output sequence, `[batch, v_len, hidden_dim]`.
    /// * `prev_align` - alignment returned by the previous call,
    ///   `[batch, num_heads, v_len]`, or `None` on the first step.
    ///
    /// # Returns
    /// `(output, align)` - `output` `[batch, 1, hidden_dim]`,
    /// `align` `[batch, num_heads, v_len]`.
    ///
    /// # Errors
    /// `SttError::Shape` when any dimension invariant is violated. The value
    /// sequence length of `prev_align` must match `value`; the caller keeps
    /// the two in sync across steps.
    pub fn forward(
        &self,
        query: &Tensor,
        value: &Tensor,
        prev_align: Option<&Tensor>,
    ) -> SttResult<(Tensor, Tensor)> {
        let (batch_size, q_len, q_dim) =
            dims3_named(query, "query", "[batch, q_len, hidden_dim]")?;
        let (v_batch, v_len, v_dim) =
            dims3_named(value, "value", "[batch, v_len, hidden_dim]")?;

        if q_dim != self.hidden_dim || v_dim != self.hidden_dim {
            return Err(SttError::Shape(format!(
                "query and value must have hidden_dim {}, got query {:?} / value {:?}",
                self.hidden_dim,
                query.dims(),
                value.dims()
            )));
        }
        if v_batch != batch_size {
            return Err(SttError::Shape(format!(
                "query batch {} does not match value batch {}",
                batch_size, v_batch
            )));
        }
        if q_len != 1 {
            return Err(SttError::Shape(format!(
                "hybrid attention consumes one decoding step per call, got q_len {}",
                q_len
            )));
        }

        let residual = query;

        // First step: all-zero alignment.
        let zero_align;
        let prev_align = match prev_align {
            Some(align) => {
                let dims = align.dims();
                if dims != [batch_size, self.num_heads, v_len] {
                    return Err(SttError::Shape(format!(
                        "prev_align must be [{}, {}, {}], got {:?}",
                        batch_size, self.num_heads, v_len, dims
                    )));
                }
                align
            }
            None => {
                zero_align = Tensor::zeros(
                    (batch_size, self.num_heads, v_len),
                    value.dtype(),
                    value.device(),
                )?;
                &zero_align
            }
        };

        if stt_core::debug::enabled() {
            eprintln!(
                "DEBUG hybrid attention: batch={batch_size}, v_len={v_len}, heads={}",
                self.num_heads
            );
        }

        let loc_energy = self.location.forward(prev_align)?;

        // Head split: flatten batch and head axes together for matrix scoring.
        let q = self
            .q_proj
            .forward(query)?
            .reshape((batch_size, q_len, self.num_heads, self.dim))?
            .permute((0, 2, 1, 3))?
            .contiguous()?
            .reshape((batch_size * self.num_heads, 1, self.dim))?;
        let v = self
            .v_proj
            .forward(value)?
            .reshape((batch_size, v_len, self.num_heads, self.dim))?
            .permute((0, 2, 1, 3))?
            .contiguous()?
            .reshape((batch_size * self.num_heads, v_len, self.dim))?;

        let align = self.fusion.forward(&q, &v, &loc_energy)?;

        // Context: per-head weighted sum, heads concatenated back.
        let context = align
            .unsqueeze(1)?
            .contiguous()?
            .matmul(&v)?
            .reshape((batch_size, 1, self.num_heads * self.dim))?;
        let align = align.reshape((batch_size, self.num_heads, v_len))?;

        // Output: context combined with the unprojected query.
        let combined = Tensor::cat(&[&context, residual], D::Minus1)?;
        let output = self.output_proj.forward(&combined)?;

        Ok((output, align))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn attention(config: &HybridAttentionConfig) -> LocationAwareAttention {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        LocationAwareAttention::new(config, vb).unwrap()
    }

    fn test_config() -> HybridAttentionConfig {
        HybridAttentionConfig {
            hidden_dim: 16,
            num_heads: 2,
            conv_out_channel: 4,
        }
    }

    fn assert_close(a: &Tensor, b: &Tensor, tol: f32) {
        let a = a.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let b = b.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_output_shape_matches_query() {
        let device = Device::Cpu;
        let attn = attention(&test_config());
        let query = Tensor::randn(0f32, 1.0, (3, 1, 16), &device).unwrap();
        let value = Tensor::randn(0f32, 1.0, (3, 7, 16), &device).unwrap();

        let (output, align) = attn.forward(&query, &value, None).unwrap();
        assert_eq!(output.dims(), query.dims());
        assert_eq!(align.dims(), &[3, 2, 7]);
    }

    #[test]
    fn test_alignment_rows_sum_to_one() {
        let device = Device::Cpu;
        let attn = attention(&test_config());
        let query = Tensor::randn(0f32, 1.0, (2, 1, 16), &device).unwrap();
        let value = Tensor::randn(0f32, 1.0, (2, 5, 16), &device).unwrap();

        let (_, align) = attn.forward(&query, &value, None).unwrap();
        let sums = align.sum(D::Minus1).unwrap().flatten_all().unwrap();
        for s in sums.to_vec1::<f32>().unwrap() {
            assert!((s - 1.0).abs() < 1e-5, "row sum {s}");
        }
        let min = align
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap()
            .into_iter()
            .fold(f32::INFINITY, f32::min);
        assert!(min >= 0.0);
    }

    #[test]
    fn test_none_equals_explicit_zero_alignment() {
        let device = Device::Cpu;
        let attn = attention(&test_config());
        let query = Tensor::randn(0f32, 1.0, (2, 1, 16), &device).unwrap();
        let value = Tensor::randn(0f32, 1.0, (2, 5, 16), &device).unwrap();
        let zeros = Tensor::zeros((2, 2, 5), DType::F32, &device).unwrap();

        let (out_none, align_none) = attn.forward(&query, &value, None).unwrap();
        let (out_zero, align_zero) = attn.forward(&query, &value, Some(&zeros)).unwrap();
        assert_close(&out_none, &out_zero, 1e-6);
        assert_close(&align_none, &align_zero, 1e-6);
    }

    #[test]
    fn test_constant_value_context_stable_across_steps() {
        // With a constant value tensor every convex combination of its rows
        // is the same vector, so the output must not change as the alignment
        // is carried across steps.
        let device = Device::Cpu;
        let attn = attention(&test_config());
        let query = Tensor::ones((1, 1, 16), DType::F32, &device).unwrap();
        let value = Tensor::ones((1, 5, 16), DType::F32, &device).unwrap();

        let (first_output, mut align) = attn.forward(&query, &value, None).unwrap();
        for _ in 0..2 {
            let (output, next_align) = attn.forward(&query, &value, Some(&align)).unwrap();
            let sums = next_align.sum(D::Minus1).unwrap().flatten_all().unwrap();
            for s in sums.to_vec1::<f32>().unwrap() {
                assert!((s - 1.0).abs() < 1e-5);
            }
            assert_close(&output, &first_output, 1e-5);
            align = next_align;
        }
    }

    #[test]
    fn test_rejects_multi_step_query() {
        let device = Device::Cpu;
        let attn = attention(&test_config());
        let query = Tensor::randn(0f32, 1.0, (1, 2, 16), &device).unwrap();
        let value = Tensor::randn(0f32, 1.0, (1, 5, 16), &device).unwrap();
        assert!(attn.forward(&query, &value, None).is_err());
    }

    #[test]
    fn test_rejects_mismatched_prev_alignment() {
        let device = Device::Cpu;
        let attn = attention(&test_config());
        let query = Tensor::randn(0f32, 1.0, (1, 1, 16), &device).unwrap();
        let value = Tensor::randn(0f32, 1.0, (1, 5, 16), &device).unwrap();
        let stale = Tensor::zeros((1, 2, 9), DType::F32, &device).unwrap();
        assert!(attn.forward(&query, &value, Some(&stale)).is_err());
    }

    #[test]
    fn test_rejects_hidden_dim_mismatch() {
        let device = Device::Cpu;
        let attn = attention(&test_config());
        let query = Tensor::randn(0f32, 1.0, (1, 1, 16), &device).unwrap();
        let value = Tensor::randn(0f32, 1.0, (1, 5, 32), &device).unwrap();
        assert!(attn.forward(&query, &value, None).is_err());
    }
}
