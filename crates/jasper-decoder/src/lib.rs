//! Jasper-style convolutional decoder head.
//!
//! A thin stack of 1-D convolution post-processing blocks over encoder
//! outputs, followed by log-softmax over the class axis.

pub mod config;
pub mod decoder;
pub mod sublayers;

pub use config::JasperDecoderConfig;
pub use decoder::JasperDecoder;
pub use sublayers::JasperSubBlock;
