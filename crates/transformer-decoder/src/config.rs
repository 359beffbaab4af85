//! Configuration for the Transformer decoder.

use serde::{Deserialize, Serialize};
use std::path::Path;

use stt_core::{SttError, SttResult};

/// Style of the position-wise feed-forward sublayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedForwardStyle {
    /// Two affine transforms with ReLU between.
    #[serde(rename = "ff")]
    Linear,
    /// Kernel-size-1 convolution pair.
    #[serde(rename = "conv")]
    Conv,
}

/// Configuration for [`crate::TransformerDecoder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerDecoderConfig {
    /// Number of output classes (vocabulary size).
    pub num_classes: usize,

    /// Dimension of the model.
    pub d_model: usize,

    /// Dimension of the feed-forward network.
    pub d_ff: usize,

    /// Number of decoder layers.
    pub num_layers: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Style of the feed-forward network.
    pub ffnet_style: FeedForwardStyle,

    /// Probability of dropout.
    pub dropout_p: f32,

    /// Padding token id.
    pub pad_id: u32,

    /// Start-of-sequence token id.
    pub sos_id: u32,

    /// End-of-sequence token id.
    pub eos_id: u32,

    /// Maximum length for decoding.
    pub max_length: usize,
}

impl TransformerDecoderConfig {
    /// Reference hyperparameters for a given vocabulary size.
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            d_model: 512,
            d_ff: 512,
            num_layers: 6,
            num_heads: 8,
            ffnet_style: FeedForwardStyle::Linear,
            dropout_p: 0.3,
            pad_id: 0,
            sos_id: 1,
            eos_id: 2,
            max_length: 400,
        }
    }

    /// Per-head dimension.
    pub fn head_dim(&self) -> usize {
        self.d_model / self.num_heads
    }

    /// Check the construction-time invariants.
    ///
    /// # Errors
    /// Returns `SttError::Config` for non-positive sizes, a model dimension
    /// not divisible by the head count, or a dropout probability outside
    /// [0, 1).
    pub fn validate(&self) -> SttResult<()> {
        if self.num_classes == 0
            || self.d_model == 0
            || self.d_ff == 0
            || self.num_layers == 0
            || self.num_heads == 0
            || self.max_length == 0
        {
            return Err(SttError::Config(format!(
                "decoder hyperparameters must be positive: num_classes={}, d_model={}, \
                 d_ff={}, num_layers={}, num_heads={}, max_length={}",
                self.num_classes,
                self.d_model,
                self.d_ff,
                self.num_layers,
                self.num_heads,
                self.max_length
            )));
        }
        if self.d_model % self.num_heads != 0 {
            return Err(SttError::Config(format!(
                "d_model {} must be divisible by num_heads {}",
                self.d_model, self.num_heads
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_p) {
            return Err(SttError::Config(format!(
                "dropout_p must be in [0, 1), got {}",
                self.dropout_p
            )));
        }
        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> SttResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
