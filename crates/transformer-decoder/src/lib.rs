//! Transformer decoder for speech recognition.
//!
//! A stack of N identical layers, each made of masked self-attention,
//! encoder cross-attention and a position-wise feed-forward network, all
//! wrapped in add-and-normalize. Supports full-sequence (teacher-forced)
//! decoding and incremental step-by-step decoding.

pub mod attention;
pub mod config;
pub mod embedding;
pub mod layers;
pub mod mask;
pub mod model;
pub mod position;
pub mod sublayers;

pub use attention::MultiHeadAttention;
pub use config::{FeedForwardStyle, TransformerDecoderConfig};
pub use embedding::Embedding;
pub use layers::DecoderLayer;
pub use model::TransformerDecoder;
pub use position::PositionalEncoding;
pub use sublayers::PositionwiseFeedForward;
