//! Configuration for the Jasper decoder.

use serde::{Deserialize, Serialize};

use stt_core::{SttError, SttResult};

/// Number of post-processing blocks in the decoder.
pub const NUM_BLOCKS: usize = 3;

/// Configuration for [`crate::JasperDecoder`].
///
/// Per-block channel, kernel, dilation and dropout settings for the three
/// post-processing blocks. The last block projects to `num_classes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JasperDecoderConfig {
    /// Number of output classes (vocabulary size).
    pub num_classes: usize,

    /// Input channels per block.
    pub in_channels: [usize; NUM_BLOCKS],

    /// Output channels per block.
    pub out_channels: [usize; NUM_BLOCKS],

    /// Kernel size per block.
    pub kernel_size: [usize; NUM_BLOCKS],

    /// Dilation per block.
    pub dilation: [usize; NUM_BLOCKS],

    /// Dropout probability per block.
    pub dropout_p: [f32; NUM_BLOCKS],
}

impl JasperDecoderConfig {
    /// Reference Jasper post-processing blocks for a given vocabulary size.
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            in_channels: [768, 896, 1024],
            out_channels: [896, 1024, num_classes],
            kernel_size: [29, 1, 1],
            dilation: [2, 1, 1],
            dropout_p: [0.4, 0.4, 0.0],
        }
    }

    /// Check the construction-time invariants.
    pub fn validate(&self) -> SttResult<()> {
        if self.num_classes == 0 {
            return Err(SttError::Config("num_classes must be positive".to_string()));
        }
        for i in 0..NUM_BLOCKS {
            if self.in_channels[i] == 0
                || self.out_channels[i] == 0
                || self.kernel_size[i] == 0
                || self.dilation[i] == 0
            {
                return Err(SttError::Config(format!(
                    "jasper block {i} has a zero-sized hyperparameter"
                )));
            }
            if self.kernel_size[i] % 2 == 0 {
                return Err(SttError::Config(format!(
                    "jasper block {i} kernel size {} must be odd to preserve length",
                    self.kernel_size[i]
                )));
            }
        }
        for i in 1..NUM_BLOCKS {
            if self.in_channels[i] != self.out_channels[i - 1] {
                return Err(SttError::Config(format!(
                    "jasper block {i} input channels {} do not match block {} output channels {}",
                    self.in_channels[i],
                    i - 1,
                    self.out_channels[i - 1]
                )));
            }
        }
        if self.out_channels[NUM_BLOCKS - 1] != self.num_classes {
            return Err(SttError::Config(format!(
                "final block must project to num_classes {}, got {}",
                self.num_classes,
                self.out_channels[NUM_BLOCKS - 1]
            )));
        }
        Ok(())
    }
}
