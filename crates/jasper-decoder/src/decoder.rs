//! Jasper decoder: three post-processing blocks and log-softmax.

use candle_core::{D, Tensor};
use candle_nn::VarBuilder;
use tracing::debug;

use stt_core::{SttError, SttResult};

use crate::config::{JasperDecoderConfig, NUM_BLOCKS};
use crate::sublayers::JasperSubBlock;

/// Convolutional decoder head over encoder outputs.
///
/// Chains the configured sub-blocks over the channel axis and normalizes
/// the result with log-softmax over the class axis. Stride-1 same-padding
/// convolutions leave the sequence lengths unchanged.
#[derive(Debug, Clone)]
pub struct JasperDecoder {
    layers: Vec<JasperSubBlock>,
    config: JasperDecoderConfig,
}

impl JasperDecoder {
    /// Build the decoder, creating parameters through `vb`.
    ///
    /// The final block carries a bias, the preceding ones do not.
    pub fn new(config: JasperDecoderConfig, vb: VarBuilder) -> SttResult<Self> {
        config.validate()?;

        let mut layers = Vec::with_capacity(NUM_BLOCKS);
        for i in 0..NUM_BLOCKS {
            layers.push(JasperSubBlock::new(
                config.in_channels[i],
                config.out_channels[i],
                config.kernel_size[i],
                config.dilation[i],
                config.dropout_p[i],
                i == NUM_BLOCKS - 1,
                vb.pp(format!("layers.{i}")),
            )?);
        }

        debug!(num_classes = config.num_classes, "jasper decoder built");
        Ok(Self { layers, config })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `encoder_outputs` - `[batch, time, in_channels]`.
    /// * `encoder_output_lengths` - valid length per batch element.
    /// * `train` - enables dropout.
    ///
    /// # Returns
    /// `(log_probs, output_lengths)` - `log_probs`
    /// `[batch, time, num_classes]`; lengths are unchanged.
    pub fn forward(
        &self,
        encoder_outputs: &Tensor,
        encoder_output_lengths: &[usize],
        train: bool,
    ) -> SttResult<(Tensor, Vec<usize>)> {
        let (batch_size, _, channels) = encoder_outputs.dims3().map_err(|_| {
            SttError::Shape(format!(
                "encoder_outputs must be [batch, time, channels], got shape {:?}",
                encoder_outputs.dims()
            ))
        })?;
        if channels != self.config.in_channels[0] {
            return Err(SttError::Shape(format!(
                "encoder_outputs channels {} do not match first block input {}",
                channels, self.config.in_channels[0]
            )));
        }
        if encoder_output_lengths.len() != batch_size {
            return Err(SttError::Shape(format!(
                "encoder_output_lengths has {} entries for batch {}",
                encoder_output_lengths.len(),
                batch_size
            )));
        }

        // [batch, time, channels] -> [batch, channels, time] for conv
        let mut output = encoder_outputs.transpose(1, 2)?.contiguous()?;
        for layer in &self.layers {
            output = layer.forward(&output, train)?;
        }
        let output = output.transpose(1, 2)?.contiguous()?;

        let log_probs = candle_nn::ops::log_softmax(&output, D::Minus1)?;
        Ok((log_probs, encoder_output_lengths.to_vec()))
    }
}
