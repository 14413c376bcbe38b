use std::path::{Path, PathBuf};

use crate::error::TtsError;
use crate::voices::ProfileArtifacts;
use crate::{BackendLoader, Conditioning, SpeechBackend, SynthesisParams};

use super::model::{optimized_cache_path, OnnxModel, SAMPLE_RATE};
use super::phonemizer::{espeak_voice, phonemize, EspeakConfig};
use super::style::StyleTable;
use super::vocab::{load_vocab, punctuation_ids, Vocab};

/// Builds [`OnnxBackend`]s from resolved profile artifacts.
#[derive(Debug, Clone, Default)]
pub struct OnnxLoader {
    /// Number of CPU threads for inference. `None` uses the ORT default.
    pub num_threads: Option<usize>,
    /// Directory for serialised Level3-optimised graphs.
    ///
    /// The first load optimises and writes the graph here; later loads read it
    /// back and skip optimisation. Must be writable.
    pub optimized_cache_dir: Option<PathBuf>,
    pub espeak: EspeakConfig,
}

impl BackendLoader for OnnxLoader {
    type Backend = OnnxBackend;

    fn load(&self, artifacts: &ProfileArtifacts) -> Result<OnnxBackend, TtsError> {
        let cache = self
            .optimized_cache_dir
            .as_deref()
            .map(|dir| optimized_cache_path(dir, &artifacts.model));
        let model = OnnxModel::load(&artifacts.model, self.num_threads, cache.as_deref())?;

        // A dedicated tokenizer file wins over the vocab embedded in the config.
        let vocab_source = artifacts.tokenizer.as_deref().unwrap_or(&artifacts.config);
        log::info!("Loading vocab from {}", vocab_source.display());
        let vocab = load_vocab(vocab_source)?;

        Ok(OnnxBackend::new(model, vocab, self.espeak.clone()))
    }
}

/// ONNX speech model driven by espeak-ng phonemes and style-vector conditioning.
pub struct OnnxBackend {
    model: OnnxModel,
    punctuation: Vec<i64>,
    vocab: Vocab,
    espeak: EspeakConfig,
}

impl OnnxBackend {
    pub fn new(model: OnnxModel, vocab: Vocab, espeak: EspeakConfig) -> Self {
        Self {
            model,
            punctuation: punctuation_ids(&vocab),
            vocab,
            espeak,
        }
    }
}

impl SpeechBackend for OnnxBackend {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Reference is a `.npy` style table; the table is the latent and its
    /// mean the speaker embedding.
    fn condition(&self, reference: &Path) -> Result<Conditioning, TtsError> {
        let table = StyleTable::load(reference)?;
        if table.is_empty() {
            return Err(TtsError::Config(format!(
                "style file {} holds no vectors",
                reference.display()
            )));
        }
        Ok(table.to_conditioning())
    }

    fn synthesize(
        &self,
        text: &str,
        conditioning: &Conditioning,
        params: &SynthesisParams,
    ) -> Result<Vec<f32>, TtsError> {
        let lang = espeak_voice(&params.language);
        let ids = phonemize(text, &lang, &self.vocab, &self.espeak)?;
        if ids.is_empty() {
            log::warn!("No phoneme tokens produced for text: {text:?}");
            return Ok(Vec::new());
        }

        // Style row chosen by token count; fall back to the mean vector.
        let table = StyleTable::from_flat(&conditioning.latent);
        let style = match &table {
            Ok(table) => table.row(ids.len()),
            Err(_) => conditioning.speaker_embedding.as_slice(),
        };

        let samples = self.model.infer(&ids, style, params.speed, &self.punctuation)?;
        Ok(samples)
    }
}
