//! Unified trait for incremental (step-by-step) decoders.
//!
//! A decoder implementing [`IncrementalDecoder`] is a pure step function:
//! configuration (class count, token ids, decode length cap) is fixed at
//! construction, while the mutable decode state - the growing token history
//! and the termination check - lives in the caller's loop.

use candle_core::Tensor;

use crate::error::SttResult;

/// Common contract for decoders that expand one step at a time.
///
/// # Example
/// ```ignore
/// let mut tokens = vec![decoder.sos_id()];
/// while tokens.len() < decoder.max_length() {
///     let input = Tensor::new(tokens.as_slice(), &device)?.unsqueeze(0)?;
///     let ids = decoder.forward_step(&input, &encoder_outputs, &encoder_lengths)?;
///     let next = ids.i((0, tokens.len() - 1))?.to_scalar::<u32>()?;
///     if next == decoder.eos_id() {
///         break;
///     }
///     tokens.push(next);
/// }
/// ```
pub trait IncrementalDecoder {
    /// Number of output classes (vocabulary size).
    fn num_classes(&self) -> usize;

    /// Maximum number of decoding steps.
    fn max_length(&self) -> usize;

    /// Padding token id.
    fn pad_id(&self) -> u32;

    /// Start-of-sequence token id.
    fn sos_id(&self) -> u32;

    /// End-of-sequence token id.
    fn eos_id(&self) -> u32;

    /// One greedy expansion step.
    ///
    /// # Arguments
    /// * `prev_step_outputs` - tokens decoded so far, `[batch, seq_len]` (U32).
    /// * `encoder_outputs` - encoder memory, `[batch, enc_len, d_model]`.
    /// * `encoder_output_lengths` - valid length per batch element.
    ///
    /// # Returns
    /// Greedily selected token ids per position, `[batch, seq_len]` (U32).
    fn forward_step(
        &self,
        prev_step_outputs: &Tensor,
        encoder_outputs: &Tensor,
        encoder_output_lengths: &[usize],
    ) -> SttResult<Tensor>;
}
