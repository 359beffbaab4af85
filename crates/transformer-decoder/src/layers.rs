//! Transformer decoder layer.

use candle_core::{Result, Tensor};
use candle_nn::{LayerNorm, LayerNormConfig, Module, VarBuilder, layer_norm};

use crate::attention::MultiHeadAttention;
use crate::config::TransformerDecoderConfig;
use crate::sublayers::PositionwiseFeedForward;

/// One decoder layer: masked self-attention, encoder cross-attention and a
/// position-wise feed-forward network, each wrapped in add-and-normalize.
///
/// All three sublayers preserve the `[batch, seq_len, d_model]` shape, and
/// their order is fixed - each consumes the previous sublayer's output.
#[derive(Debug, Clone)]
pub struct DecoderLayer {
    self_attention: MultiHeadAttention,
    memory_attention: MultiHeadAttention,
    feed_forward: PositionwiseFeedForward,
    self_attn_norm: LayerNorm,
    memory_attn_norm: LayerNorm,
    ff_norm: LayerNorm,
}

impl DecoderLayer {
    pub fn new(config: &TransformerDecoderConfig, vb: VarBuilder) -> Result<Self> {
        let self_attention =
            MultiHeadAttention::new(config.d_model, config.num_heads, vb.pp("self_attn"))?;
        let memory_attention =
            MultiHeadAttention::new(config.d_model, config.num_heads, vb.pp("memory_attn"))?;
        let feed_forward = PositionwiseFeedForward::new(config, vb.pp("feed_forward"))?;
        let self_attn_norm = layer_norm(
            config.d_model,
            LayerNormConfig::default(),
            vb.pp("self_attn_norm"),
        )?;
        let memory_attn_norm = layer_norm(
            config.d_model,
            LayerNormConfig::default(),
            vb.pp("memory_attn_norm"),
        )?;
        let ff_norm = layer_norm(config.d_model, LayerNormConfig::default(), vb.pp("ff_norm"))?;

        Ok(Self {
            self_attention,
            memory_attention,
            feed_forward,
            self_attn_norm,
            memory_attn_norm,
            ff_norm,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `inputs` - `[batch, seq_len, d_model]`
    /// * `memory` - encoder outputs `[batch, enc_len, d_model]`
    /// * `self_attn_mask` - `[batch, seq_len, seq_len]`, future + padding
    /// * `memory_mask` - `[batch, seq_len, enc_len]`, encoder padding
    ///
    /// # Returns
    /// `(outputs, self_attn, memory_attn)` - outputs plus both attention
    /// weight tensors of this pass.
    pub fn forward(
        &self,
        inputs: &Tensor,
        memory: &Tensor,
        self_attn_mask: Option<&Tensor>,
        memory_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let (attn_out, self_attn) =
            self.self_attention
                .forward(inputs, inputs, inputs, self_attn_mask)?;
        let outputs = self.self_attn_norm.forward(&(inputs + attn_out)?)?;

        let (attn_out, memory_attn) =
            self.memory_attention
                .forward(&outputs, memory, memory, memory_mask)?;
        let outputs = self.memory_attn_norm.forward(&(&outputs + attn_out)?)?;

        let ff_out = self.feed_forward.forward(&outputs, train)?;
        let outputs = self.ff_norm.forward(&(&outputs + ff_out)?)?;

        Ok((outputs, self_attn, memory_attn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_layer_preserves_shape() {
        let device = Device::Cpu;
        let mut config = TransformerDecoderConfig::new(10);
        config.d_model = 16;
        config.d_ff = 32;
        config.num_heads = 2;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = DecoderLayer::new(&config, vb).unwrap();

        let inputs = Tensor::randn(0f32, 1.0, (2, 4, 16), &device).unwrap();
        let memory = Tensor::randn(0f32, 1.0, (2, 7, 16), &device).unwrap();

        let (out, self_attn, memory_attn) =
            layer.forward(&inputs, &memory, None, None, false).unwrap();
        assert_eq!(out.dims(), inputs.dims());
        assert_eq!(self_attn.dims(), &[2, 2, 4, 4]);
        assert_eq!(memory_attn.dims(), &[2, 2, 4, 7]);
    }
}
