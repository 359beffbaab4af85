//! Jasper post-processing sub-block.

use candle_core::{Result, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Dropout, Module, VarBuilder};

/// One convolution sub-block: Conv1d, ReLU, dropout.
///
/// Same-padding with stride 1, so the time axis is preserved.
#[derive(Debug, Clone)]
pub struct JasperSubBlock {
    conv: Conv1d,
    dropout: Dropout,
}

impl JasperSubBlock {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dilation: usize,
        dropout_p: f32,
        bias: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv1dConfig {
            padding: (kernel_size - 1) * dilation / 2,
            dilation,
            ..Default::default()
        };
        let conv = if bias {
            candle_nn::conv1d(in_channels, out_channels, kernel_size, cfg, vb.pp("conv"))?
        } else {
            candle_nn::conv1d_no_bias(in_channels, out_channels, kernel_size, cfg, vb.pp("conv"))?
        };
        Ok(Self {
            conv,
            dropout: Dropout::new(dropout_p),
        })
    }

    /// Forward pass: `[batch, in_channels, time]` → `[batch, out_channels, time]`.
    pub fn forward(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.conv.forward(x)?.relu()?;
        self.dropout.forward(&x, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_dilated_conv_preserves_time_axis() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let block = JasperSubBlock::new(8, 12, 29, 2, 0.0, false, vb).unwrap();

        let x = Tensor::randn(0f32, 1.0, (2, 8, 40), &device).unwrap();
        let out = block.forward(&x, false).unwrap();
        assert_eq!(out.dims(), &[2, 12, 40]);
    }
}
