//! ONNX speech backend.
//!
//! Runs a style-conditioned ONNX TTS model (token IDs + 256-wide style
//! vector + speed → waveform at 24 kHz). Text is phonemised with espeak-ng
//! using its Arabic voice by default.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Profile Layout
//!
//! ```text
//! tts_model/serious/
//! ├── model.onnx     # speech model
//! ├── config.json    # {"vocab": {"ʔ": 148, ...}}
//! └── style.npy      # float32 [N, 256] reference style table
//! ```
//!
//! Any of these may instead be an `s3://bucket/key` reference resolved through
//! [`crate::artifacts::ArtifactResolver`].
//!
//! # Example
//!
//! ```rust,no_run
//! use dialect_tts::artifacts::ArtifactResolver;
//! use dialect_tts::config::VoiceProfileConfig;
//! use dialect_tts::engines::onnx::OnnxLoader;
//! use dialect_tts::voices::VoiceRegistry;
//! use std::path::Path;
//!
//! let resolver = ArtifactResolver::local_only(".cache/tts-model");
//! let loader = OnnxLoader {
//!     optimized_cache_dir: Some(".cache/ort".into()),
//!     ..Default::default()
//! };
//! let configs = [VoiceProfileConfig::under(Path::new("tts_model"), "normal")];
//! let (registry, status) = VoiceRegistry::initialize(&configs, "normal", &loader, &resolver);
//! println!("{:?} loaded, {:?}", registry.available(), status);
//! ```

mod backend;
mod model;
pub mod phonemizer;
mod style;
mod vocab;

pub use backend::{OnnxBackend, OnnxLoader};
pub use model::{OnnxError, OnnxModel, MAX_PHONEME_LEN, SAMPLE_RATE};
pub use phonemizer::EspeakConfig;
pub use style::{StyleTable, STYLE_DIM};
pub use vocab::{load_vocab, Vocab};
