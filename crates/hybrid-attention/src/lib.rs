//! Location-aware multi-head (hybrid) attention for speech recognition.
//!
//! Fuses content-based multi-head scoring with convolutional location
//! features derived from the previous timestep's alignment, producing a
//! single alignment distribution per head. The alignment is threaded by
//! the caller from one decoding step to the next.

pub mod attention;
pub mod config;

pub use attention::{LocationAwareAttention, LocationEnergy, ScoreFusion};
pub use config::HybridAttentionConfig;
