//! Attention mask construction.
//!
//! Masks are boolean (U8) tensors of shape `[batch, q_len, k_len]` where 1
//! marks a disallowed position; attention fills those scores with a large
//! negative value so their weight vanishes after softmax.

use candle_core::{Device, Result, Tensor};

/// Padding mask from sequence lengths.
///
/// Marks every key position at or beyond the element's valid length, for
/// each of `q_len` query rows.
pub fn get_attn_pad_mask(
    input_lengths: &[usize],
    k_len: usize,
    q_len: usize,
    device: &Device,
) -> Result<Tensor> {
    let batch_size = input_lengths.len();
    let mut data = vec![0u8; batch_size * q_len * k_len];
    for (b, &len) in input_lengths.iter().enumerate() {
        for q in 0..q_len {
            for k in len.min(k_len)..k_len {
                data[b * q_len * k_len + q * k_len + k] = 1;
            }
        }
    }
    Tensor::from_vec(data, (batch_size, q_len, k_len), device)
}

/// Decoder self-attention mask: padding keys combined with future positions.
///
/// # Arguments
/// * `targets` - target token ids `[batch, seq_len]` (U32).
/// * `pad_id` - padding token id; keys equal to it are masked everywhere.
pub fn get_decoder_self_attn_mask(targets: &Tensor, pad_id: u32) -> Result<Tensor> {
    let (batch_size, seq_len) = targets.dims2()?;
    let ids = targets.to_vec2::<u32>()?;

    let mut data = vec![0u8; batch_size * seq_len * seq_len];
    for (b, row) in ids.iter().enumerate() {
        for q in 0..seq_len {
            for k in 0..seq_len {
                if k > q || row[k] == pad_id {
                    data[b * seq_len * seq_len + q * seq_len + k] = 1;
                }
            }
        }
    }
    Tensor::from_vec(data, (batch_size, seq_len, seq_len), targets.device())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::IndexOp;

    #[test]
    fn test_pad_mask_marks_tail() {
        let device = Device::Cpu;
        let mask = get_attn_pad_mask(&[3, 5], 5, 2, &device).unwrap();
        assert_eq!(mask.dims(), &[2, 2, 5]);

        let first = mask.i((0, 0)).unwrap().to_vec1::<u8>().unwrap();
        assert_eq!(first, vec![0, 0, 0, 1, 1]);
        let second = mask.i((1, 1)).unwrap().to_vec1::<u8>().unwrap();
        assert_eq!(second, vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_self_attn_mask_blocks_future_and_pad() {
        let device = Device::Cpu;
        // pad_id = 0, last position is padding
        let targets = Tensor::new(&[[1u32, 4, 5, 0]], &device).unwrap();
        let mask = get_decoder_self_attn_mask(&targets, 0).unwrap();
        assert_eq!(mask.dims(), &[1, 4, 4]);

        let rows = mask.i(0).unwrap().to_vec2::<u8>().unwrap();
        assert_eq!(rows[0], vec![0, 1, 1, 1]);
        assert_eq!(rows[1], vec![0, 0, 1, 1]);
        assert_eq!(rows[2], vec![0, 0, 0, 1]);
        // pad key stays masked even for its own row
        assert_eq!(rows[3], vec![0, 0, 0, 1]);
    }
}
