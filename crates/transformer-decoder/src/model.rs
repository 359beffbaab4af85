//! Transformer decoder stack.

use candle_core::{D, Device, IndexOp, Tensor};
use candle_nn::{Dropout, Linear, Module, VarBuilder};
use tracing::debug;

use stt_core::{IncrementalDecoder, SttError, SttResult};

use crate::config::TransformerDecoderConfig;
use crate::embedding::Embedding;
use crate::layers::DecoderLayer;
use crate::mask::{get_attn_pad_mask, get_decoder_self_attn_mask};
use crate::position::PositionalEncoding;

/// Transformer decoder: a stack of N identical layers over embedded target
/// tokens, attending to the encoder memory.
///
/// Two execution modes:
/// - full-sequence ([`Self::forward`]) - teacher-forced decoding of a whole
///   target sequence under causal and padding masks, returning the last
///   layer's hidden states;
/// - incremental ([`Self::forward_step`]) - one greedy expansion over the
///   tokens decoded so far, returning arg-max token ids. The step recomputes
///   the prefix each call; past key/value pairs are not cached.
///
/// The module holds no mutable decode state - the token history and the
/// termination check belong to the caller's loop ([`Self::decode`] packages
/// that loop for the common greedy case).
#[derive(Debug, Clone)]
pub struct TransformerDecoder {
    config: TransformerDecoderConfig,
    embedding: Embedding,
    positional_encoding: PositionalEncoding,
    input_dropout: Dropout,
    layers: Vec<DecoderLayer>,
    fc: Linear,
    device: Device,
}

impl TransformerDecoder {
    /// Build the decoder, creating parameters through `vb`.
    ///
    /// Fails immediately with `SttError::Config` on invalid hyperparameters.
    pub fn new(config: TransformerDecoderConfig, vb: VarBuilder) -> SttResult<Self> {
        config.validate()?;
        let device = vb.device().clone();

        let embedding = Embedding::new(config.num_classes, config.d_model, vb.pp("embedding"))?;
        let positional_encoding =
            PositionalEncoding::new(config.d_model, config.max_length, &device)?;
        let input_dropout = Dropout::new(config.dropout_p);

        let mut layers = Vec::with_capacity(config.num_layers);
        for i in 0..config.num_layers {
            layers.push(DecoderLayer::new(&config, vb.pp(format!("layers.{i}")))?);
        }

        let fc = candle_nn::linear(config.d_model, config.num_classes, vb.pp("fc"))?;

        debug!(
            num_layers = config.num_layers,
            d_model = config.d_model,
            num_classes = config.num_classes,
            "transformer decoder built"
        );

        Ok(Self {
            config,
            embedding,
            positional_encoding,
            input_dropout,
            layers,
            fc,
            device,
        })
    }

    /// Decoder configuration.
    pub fn config(&self) -> &TransformerDecoderConfig {
        &self.config
    }

    fn validate_inputs(
        &self,
        targets: &Tensor,
        encoder_outputs: &Tensor,
        encoder_output_lengths: &[usize],
    ) -> SttResult<(usize, usize, usize)> {
        let (batch_size, target_len) = targets.dims2().map_err(|_| {
            SttError::Shape(format!(
                "targets must be [batch, seq_len] token ids, got shape {:?}",
                targets.dims()
            ))
        })?;
        let (enc_batch, enc_len, enc_dim) = encoder_outputs.dims3().map_err(|_| {
            SttError::Shape(format!(
                "encoder_outputs must be [batch, enc_len, d_model], got shape {:?}",
                encoder_outputs.dims()
            ))
        })?;

        if enc_batch != batch_size {
            return Err(SttError::Shape(format!(
                "targets batch {} does not match encoder_outputs batch {}",
                batch_size, enc_batch
            )));
        }
        if enc_dim != self.config.d_model {
            return Err(SttError::Shape(format!(
                "encoder_outputs feature dim {} does not match d_model {}",
                enc_dim, self.config.d_model
            )));
        }
        if encoder_output_lengths.len() != batch_size {
            return Err(SttError::Shape(format!(
                "encoder_output_lengths has {} entries for batch {}",
                encoder_output_lengths.len(),
                batch_size
            )));
        }
        if target_len > self.config.max_length {
            return Err(SttError::Shape(format!(
                "target length {} exceeds max_length {}",
                target_len, self.config.max_length
            )));
        }
        Ok((batch_size, target_len, enc_len))
    }

    /// Full-sequence (teacher-forced) forward pass.
    ///
    /// Builds the causal + padding self-attention mask and the encoder
    /// padding cross-attention mask, embeds the targets with positional
    /// encoding and input dropout, then applies each layer in order against
    /// the unmodified encoder memory.
    ///
    /// # Arguments
    /// * `targets` - target token ids `[batch, target_len]` (U32).
    /// * `encoder_outputs` - `[batch, enc_len, d_model]`.
    /// * `encoder_output_lengths` - valid encoder length per batch element.
    /// * `train` - enables dropout.
    ///
    /// # Returns
    /// Last layer's hidden states `[batch, target_len, d_model]`.
    pub fn forward(
        &self,
        targets: &Tensor,
        encoder_outputs: &Tensor,
        encoder_output_lengths: &[usize],
        train: bool,
    ) -> SttResult<Tensor> {
        let (_, target_len, enc_len) =
            self.validate_inputs(targets, encoder_outputs, encoder_output_lengths)?;

        let self_attn_mask = get_decoder_self_attn_mask(targets, self.config.pad_id)?;
        let memory_mask =
            get_attn_pad_mask(encoder_output_lengths, enc_len, target_len, &self.device)?;

        let pos = self.positional_encoding.forward(target_len)?;
        let mut outputs = self.embedding.forward(targets)?.broadcast_add(&pos)?;
        outputs = self.input_dropout.forward(&outputs, train)?;

        for layer in &self.layers {
            let (next, _self_attn, _memory_attn) = layer.forward(
                &outputs,
                encoder_outputs,
                Some(&self_attn_mask),
                Some(&memory_mask),
                train,
            )?;
            outputs = next;
        }

        Ok(outputs)
    }

    /// One greedy expansion step over the tokens decoded so far.
    ///
    /// Runs a full decoding pass over the prefix, projects to class logits
    /// and selects the highest-scoring class per position. Returns token ids
    /// `[batch, seq_len]` (U32), not probabilities; termination via
    /// `eos_id` / `max_length` is the caller's responsibility.
    pub fn forward_step(
        &self,
        prev_step_outputs: &Tensor,
        encoder_outputs: &Tensor,
        encoder_output_lengths: &[usize],
    ) -> SttResult<Tensor> {
        let hidden = self.forward(
            prev_step_outputs,
            encoder_outputs,
            encoder_output_lengths,
            false,
        )?;
        let logits = self.fc.forward(&hidden)?;
        Ok(logits.argmax(D::Minus1)?)
    }

    /// Greedy autoregressive decoding for a single utterance.
    ///
    /// Starts from `sos_id` and repeatedly calls [`Self::forward_step`],
    /// feeding each predicted token back as input, until `eos_id` is
    /// produced or `max_length` is reached. Returns the token history
    /// including the leading `sos_id`, excluding `eos_id`.
    pub fn decode(
        &self,
        encoder_outputs: &Tensor,
        encoder_output_lengths: &[usize],
    ) -> SttResult<Vec<u32>> {
        let (enc_batch, _, _) = encoder_outputs.dims3().map_err(|_| {
            SttError::Shape(format!(
                "encoder_outputs must be [batch, enc_len, d_model], got shape {:?}",
                encoder_outputs.dims()
            ))
        })?;
        if enc_batch != 1 {
            return Err(SttError::Decode(format!(
                "greedy decode expects a single utterance, got batch {}",
                enc_batch
            )));
        }

        let mut tokens = vec![self.config.sos_id];
        for _ in 1..self.config.max_length {
            let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ids = self.forward_step(&input, encoder_outputs, encoder_output_lengths)?;
            let next = ids.i((0, tokens.len() - 1))?.to_scalar::<u32>()?;
            if next == self.config.eos_id {
                break;
            }
            tokens.push(next);
        }

        debug!(steps = tokens.len(), "greedy decode finished");
        Ok(tokens)
    }
}

impl IncrementalDecoder for TransformerDecoder {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn max_length(&self) -> usize {
        self.config.max_length
    }

    fn pad_id(&self) -> u32 {
        self.config.pad_id
    }

    fn sos_id(&self) -> u32 {
        self.config.sos_id
    }

    fn eos_id(&self) -> u32 {
        self.config.eos_id
    }

    fn forward_step(
        &self,
        prev_step_outputs: &Tensor,
        encoder_outputs: &Tensor,
        encoder_output_lengths: &[usize],
    ) -> SttResult<Tensor> {
        TransformerDecoder::forward_step(
            self,
            prev_step_outputs,
            encoder_outputs,
            encoder_output_lengths,
        )
    }
}
