//! Sinusoidal positional encoding.

use candle_core::{Device, Result, Tensor};

/// Sinusoidal positional encoding table.
///
/// `pe[pos, 2i] = sin(pos / 10000^(2i/d_model))`,
/// `pe[pos, 2i+1] = cos(pos / 10000^(2i/d_model))`.
/// Precomputed once up to `max_length` and sliced per forward call.
#[derive(Debug, Clone)]
pub struct PositionalEncoding {
    table: Tensor,
}

impl PositionalEncoding {
    pub fn new(d_model: usize, max_length: usize, device: &Device) -> Result<Self> {
        let mut data = vec![0f32; max_length * d_model];
        for pos in 0..max_length {
            for i in (0..d_model).step_by(2) {
                let angle = pos as f64 / 10000f64.powf(i as f64 / d_model as f64);
                data[pos * d_model + i] = angle.sin() as f32;
                if i + 1 < d_model {
                    data[pos * d_model + i + 1] = angle.cos() as f32;
                }
            }
        }
        let table = Tensor::from_vec(data, (max_length, d_model), device)?;
        Ok(Self { table })
    }

    /// Positional encodings for a sequence length: `[seq_len, d_model]`.
    pub fn forward(&self, seq_len: usize) -> Result<Tensor> {
        self.table.narrow(0, 0, seq_len)
    }
}
