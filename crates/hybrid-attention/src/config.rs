//! Configuration for the hybrid attention module.

use serde::{Deserialize, Serialize};
use std::path::Path;

use stt_core::{SttError, SttResult};

/// Configuration for [`crate::LocationAwareAttention`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridAttentionConfig {
    /// Hidden dimension shared by query and value.
    pub hidden_dim: usize,

    /// Number of attention heads.
    pub num_heads: usize,

    /// Number of output channels of the location convolution.
    pub conv_out_channel: usize,
}

impl Default for HybridAttentionConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 512,
            num_heads: 8,
            conv_out_channel: 10,
        }
    }
}

impl HybridAttentionConfig {
    /// Per-head sub-space dimension.
    pub fn head_dim(&self) -> usize {
        self.hidden_dim / self.num_heads
    }

    /// Check the construction-time invariants.
    ///
    /// # Errors
    /// Returns `SttError::Config` if any hyperparameter is zero or
    /// `hidden_dim` is not divisible by `num_heads`.
    pub fn validate(&self) -> SttResult<()> {
        if self.hidden_dim == 0 || self.num_heads == 0 || self.conv_out_channel == 0 {
            return Err(SttError::Config(format!(
                "hybrid attention hyperparameters must be positive: \
                 hidden_dim={}, num_heads={}, conv_out_channel={}",
                self.hidden_dim, self.num_heads, self.conv_out_channel
            )));
        }
        if self.hidden_dim % self.num_heads != 0 {
            return Err(SttError::Config(format!(
                "hidden_dim {} must be divisible by num_heads {}",
                self.hidden_dim, self.num_heads
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HybridAttentionConfig::default();
        assert_eq!(config.hidden_dim, 512);
        assert_eq!(config.num_heads, 8);
        assert_eq!(config.head_dim(), 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_indivisible_heads_rejected() {
        let config = HybridAttentionConfig {
            hidden_dim: 10,
            num_heads: 3,
            conv_out_channel: 4,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_heads_rejected() {
        let config = HybridAttentionConfig {
            hidden_dim: 16,
            num_heads: 0,
            conv_out_channel: 4,
        };
        assert!(config.validate().is_err());
    }
}
