//! # stt-core
//!
//! Shared foundation for the RustSTT decoder workspace:
//!
//! - Unified error handling through [`SttError`] / [`SttResult`]
//! - Trait [`IncrementalDecoder`] - the common contract for decoders
//!   that expand one step at a time
//! - Env-gated verbose debug output (`debug::enabled()`)

pub mod debug;
pub mod error;
pub mod traits;

pub use error::{SttError, SttResult};
pub use traits::IncrementalDecoder;
