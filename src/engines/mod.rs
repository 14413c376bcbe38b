//! Speech synthesis backends.
//!
//! Every backend implements [`crate::SpeechBackend`] and is built per voice
//! profile by a [`crate::BackendLoader`].
//!
//! # Available Backends
//!
//! Enable backends via Cargo features:
//! - `onnx` - style-conditioned ONNX model (espeak-ng required)

#[cfg(feature = "onnx")]
pub mod onnx;
