//! Position-wise feed-forward sublayer.

use candle_core::{Result, Tensor};
use candle_nn::{Conv1d, Dropout, Linear, Module, VarBuilder};

use crate::config::{FeedForwardStyle, TransformerDecoderConfig};

/// Position-wise feed-forward network.
///
/// Two affine transforms with ReLU between. The `conv` style replaces the
/// affine pair with kernel-size-1 convolutions over the time axis; both
/// styles preserve the `[batch, seq_len, d_model]` shape.
#[derive(Debug, Clone)]
pub struct PositionwiseFeedForward {
    inner: FeedForwardInner,
    dropout: Dropout,
}

#[derive(Debug, Clone)]
enum FeedForwardInner {
    Linear { fc1: Linear, fc2: Linear },
    Conv { conv1: Conv1d, conv2: Conv1d },
}

impl PositionwiseFeedForward {
    pub fn new(config: &TransformerDecoderConfig, vb: VarBuilder) -> Result<Self> {
        let inner = match config.ffnet_style {
            FeedForwardStyle::Linear => FeedForwardInner::Linear {
                fc1: candle_nn::linear(config.d_model, config.d_ff, vb.pp("fc1"))?,
                fc2: candle_nn::linear(config.d_ff, config.d_model, vb.pp("fc2"))?,
            },
            FeedForwardStyle::Conv => FeedForwardInner::Conv {
                conv1: candle_nn::conv1d(
                    config.d_model,
                    config.d_ff,
                    1,
                    Default::default(),
                    vb.pp("conv1"),
                )?,
                conv2: candle_nn::conv1d(
                    config.d_ff,
                    config.d_model,
                    1,
                    Default::default(),
                    vb.pp("conv2"),
                )?,
            },
        };
        Ok(Self {
            inner,
            dropout: Dropout::new(config.dropout_p),
        })
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        match &self.inner {
            FeedForwardInner::Linear { fc1, fc2 } => {
                let hidden = fc1.forward(x)?.relu()?;
                let hidden = self.dropout.forward(&hidden, train)?;
                let out = fc2.forward(&hidden)?;
                self.dropout.forward(&out, train)
            }
            FeedForwardInner::Conv { conv1, conv2 } => {
                // [batch, seq, d_model] -> [batch, d_model, seq] for conv
                let hidden = x.transpose(1, 2)?;
                let hidden = conv1.forward(&hidden)?.relu()?;
                let hidden = self.dropout.forward(&hidden, train)?;
                let out = conv2.forward(&hidden)?.transpose(1, 2)?;
                self.dropout.forward(&out, train)
            }
        }
    }
}
