//! # dialect-tts
//!
//! Turns written Arabic news into spoken podcast episodes.
//!
//! Modern Standard Arabic is first rewritten into a colloquial dialect by a
//! chat-completion service (with a separate validation call and bounded retries),
//! then synthesized with a neural voice into one continuous WAV file.
//!
//! ## Features
//!
//! - **Dialect rewriting**: generate → validate → retry with a defined give-up point
//! - **Chunked synthesis**: sentence/clause-aware chunking sized for the speech model
//! - **Seamless stitching**: linear crossfades between per-chunk waveforms
//! - **Voice profiles**: named voices with conditioning computed once at startup
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! dialect-tts = { version = "2026.2", features = ["onnx"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use dialect_tts::{
//!     artifacts::ArtifactResolver, config::Settings, engines::onnx::OnnxLoader,
//!     pipeline::SynthesisPipeline, voices::VoiceRegistry,
//! };
//!
//! let settings = Settings::load(None)?;
//! let resolver = ArtifactResolver::from_settings(&settings.storage)?;
//! let (registry, _status) = VoiceRegistry::initialize(
//!     &settings.voices,
//!     &settings.tts.default_voice,
//!     &OnnxLoader::default(),
//!     &resolver,
//! );
//! let pipeline = SynthesisPipeline::new(Arc::new(registry), settings.tts.pipeline_config())?;
//! let rendered = pipeline.synthesize("مرحبا بكم في نشرة اليوم.", "normal", None)?;
//! println!("{} ({} s)", rendered.path.display(), rendered.duration_secs);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod artifacts;
pub mod audio;
pub mod config;
pub mod engines;
pub mod episode;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod text;
pub mod voices;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

pub use audio::{combine, AudioSegment, Waveform};
pub use error::TtsError;
pub use voices::ProfileArtifacts;

/// Sample rate shared by the supported speech models.
pub const SAMPLE_RATE: u32 = 24000;

/// Pass-through parameters for one synthesis call.
///
/// Backends are usually stochastic; nothing here forces determinism.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct SynthesisParams {
    /// Language tag handed to the backend (e.g. `"ar"`).
    pub language: String,
    /// Sampling temperature, default 0.7.
    pub temperature: f32,
    /// Speech speed multiplier, default 1.0.
    pub speed: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            language: "ar".to_string(),
            temperature: 0.7,
            speed: 1.0,
        }
    }
}

/// Voice characteristics computed once from a profile's reference sample.
///
/// The pair is opaque to the orchestration layer; each backend decides what
/// the latent and the speaker embedding hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditioning {
    pub latent: Vec<f32>,
    pub speaker_embedding: Vec<f32>,
}

/// Common interface for loaded speech synthesis backends.
///
/// Implementations are shared read-only between threads once loaded, so every
/// method takes `&self`.
pub trait SpeechBackend: Send + Sync {
    /// Output sample rate of the waveforms returned by [`SpeechBackend::synthesize`].
    fn sample_rate(&self) -> u32;

    /// Longest input (in characters) the model reliably synthesizes in one call.
    fn max_chunk_chars(&self) -> usize {
        text::DEFAULT_MAX_CHUNK_CHARS
    }

    /// Compute the conditioning pair from a reference sample on disk.
    fn condition(&self, reference: &std::path::Path) -> Result<Conditioning, TtsError>;

    /// Synthesize one bounded chunk of text into raw mono samples.
    fn synthesize(
        &self,
        text: &str,
        conditioning: &Conditioning,
        params: &SynthesisParams,
    ) -> Result<Vec<f32>, TtsError>;
}

/// Builds a backend from the resolved local artifacts of one voice profile.
pub trait BackendLoader {
    type Backend: SpeechBackend;

    fn load(&self, artifacts: &ProfileArtifacts) -> Result<Self::Backend, TtsError>;
}
