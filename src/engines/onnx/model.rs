use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use sha2::{Digest, Sha256};

use crate::audio::{crossfade_append, fade_samples, DEFAULT_FADE_MS};
use crate::error::TtsError;

use super::style::STYLE_DIM;

/// Maximum number of phoneme tokens per inference call (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Output sample rate of the supported models.
pub const SAMPLE_RATE: u32 = 24000;

#[derive(thiserror::Error, Debug)]
pub enum OnnxError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Invalid vocabulary: {0}")]
    Vocab(String),
    #[error("Failed to parse style file: {0}")]
    StyleParse(String),
    #[error("Inference session poisoned by an earlier panic")]
    Poisoned,
}

impl From<OnnxError> for TtsError {
    fn from(e: OnnxError) -> Self {
        match e {
            OnnxError::Io(io) => TtsError::Io(io),
            other => TtsError::Backend(other.to_string()),
        }
    }
}

/// ONNX session plus the input layout detected at load time.
///
/// `Session::run` needs exclusive access, so calls are serialised through a
/// mutex and the model can be shared between chunk workers.
pub struct OnnxModel {
    session: Mutex<Session>,
    /// Detected input name: "input_ids" or "tokens"
    tokens_input_name: String,
    /// True if the speed input expects int32, false for float32
    speed_is_int32: bool,
}

impl OnnxModel {
    pub fn load(
        onnx_path: &Path,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, OnnxError> {
        log::info!("Loading ONNX speech model from {}", onnx_path.display());
        let session = init_session(onnx_path, num_threads, optimized_cache_path)?;

        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        log::info!(
            "Detected: tokens_input='{}', speed_is_int32={}",
            tokens_input_name,
            speed_is_int32
        );

        Ok(Self {
            session: Mutex::new(session),
            tokens_input_name,
            speed_is_int32,
        })
    }

    /// Synthesize a full token sequence, splitting it at punctuation when it
    /// exceeds [`MAX_PHONEME_LEN`].
    pub fn infer(
        &self,
        ids: &[i64],
        style: &[f32],
        speed: f32,
        punctuation_ids: &[i64],
    ) -> Result<Vec<f32>, OnnxError> {
        let pieces = if ids.len() > MAX_PHONEME_LEN {
            log::debug!(
                "Phoneme sequence exceeded limit ({} > {}), splitting",
                ids.len(),
                MAX_PHONEME_LEN
            );
            split_token_runs(ids, punctuation_ids)
        } else {
            vec![ids.to_vec()]
        };

        let fade = fade_samples(DEFAULT_FADE_MS, SAMPLE_RATE);
        let mut combined = Vec::with_capacity(ids.len() * 300);
        for piece in &pieces {
            let audio = self.run(piece, style, speed)?;
            crossfade_append(&mut combined, &audio, fade);
        }
        Ok(combined)
    }

    /// Run one inference call on `tokens` with a single style row.
    fn run(&self, tokens: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, OnnxError> {
        if style.len() != STYLE_DIM {
            return Err(OnnxError::StyleParse(format!(
                "style row has {} values, expected {STYLE_DIM}",
                style.len()
            )));
        }

        let seq_len = tokens.len() + 2;
        let mut padded = vec![0i64; seq_len];
        padded[1..seq_len - 1].copy_from_slice(tokens);
        let tokens_arr = Array2::from_shape_vec((1, seq_len), padded)?;
        let style_view = ndarray::ArrayView2::from_shape((1, STYLE_DIM), style)?;

        let mut session = self.session.lock().map_err(|_| OnnxError::Poisoned)?;
        let output = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[speed.round() as i32]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            session.run(inputs)?
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            session.run(inputs)?
        };

        let first_output = output
            .iter()
            .next()
            .ok_or_else(|| OnnxError::Ort(ort::Error::new("No output from model")))?;
        let waveform = first_output.1.try_extract_array::<f32>()?;

        Ok(waveform.iter().copied().collect())
    }
}

/// `{cache_dir}/{model stem}.{8 hex of sha256(model path)}.optimized.onnx`.
pub fn optimized_cache_path(cache_dir: &Path, onnx_path: &Path) -> PathBuf {
    let stem = onnx_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let digest = format!(
        "{:x}",
        Sha256::digest(onnx_path.to_string_lossy().as_bytes())
    );
    cache_dir.join(format!("{stem}.{}.optimized.onnx", &digest[..8]))
}

/// Build a session, reusing a serialised Level3-optimised graph when one exists.
fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, OnnxError> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let (load_path, opt_level, write_cache) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized graph from {:?}, skipping Level3", cache);
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!("First load: running Level3 optimization; saving graph to {:?}", cache);
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;

    if let Some(cache) = write_cache {
        if let Some(parent) = cache.parent() {
            std::fs::create_dir_all(parent)?;
        }
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

fn detect_tokens_input(session: &Session) -> String {
    for input in session.inputs() {
        if input.name() == "input_ids" || input.name() == "tokens" {
            return input.name().to_string();
        }
    }
    "input_ids".to_string()
}

fn detect_speed_type(session: &Session) -> bool {
    for input in session.inputs() {
        if input.name() == "speed" {
            let type_str = format!("{:?}", input.dtype());
            return type_str.contains("Int32") || type_str.contains("int32");
        }
    }
    true
}

/// Split token IDs into runs of at most [`MAX_PHONEME_LEN`], cutting after the
/// last punctuation token of each window when there is one.
pub(crate) fn split_token_runs(ids: &[i64], punctuation_ids: &[i64]) -> Vec<Vec<i64>> {
    let mut runs = Vec::new();
    let mut start = 0;

    while start < ids.len() {
        let end = (start + MAX_PHONEME_LEN).min(ids.len());
        if end == ids.len() {
            runs.push(ids[start..end].to_vec());
            break;
        }

        let split = ids[start..end]
            .iter()
            .rposition(|id| punctuation_ids.contains(id))
            .map(|i| start + i + 1)
            .unwrap_or(end);

        runs.push(ids[start..split].to_vec());
        start = split;
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sequences_are_one_run() {
        let ids: Vec<i64> = (0..100).collect();
        assert_eq!(split_token_runs(&ids, &[3]), vec![ids.clone()]);
    }

    #[test]
    fn long_sequences_split_after_punctuation() {
        let mut ids = vec![50i64; 700];
        ids[300] = 4;
        let runs = split_token_runs(&ids, &[4]);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 301);
        assert_eq!(*runs[0].last().unwrap(), 4);
        assert_eq!(runs[1].len(), 399);
    }

    #[test]
    fn long_sequences_without_punctuation_hard_split() {
        let ids = vec![50i64; 1100];
        let lens: Vec<usize> = split_token_runs(&ids, &[4]).iter().map(Vec::len).collect();
        assert_eq!(lens, [510, 510, 80]);
    }

    #[test]
    fn cache_paths_differ_per_model_file() {
        let cache = Path::new("/cache");
        let normal = optimized_cache_path(cache, Path::new("tts_model/normal/model.onnx"));
        let serious = optimized_cache_path(cache, Path::new("tts_model/serious/model.onnx"));

        assert_ne!(normal, serious);
        assert!(normal.starts_with(cache));
        let name = normal.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("model."));
        assert!(name.ends_with(".optimized.onnx"));
    }

    #[test]
    fn backend_errors_become_tts_errors() {
        let err: TtsError = OnnxError::EspeakNotFound.into();
        assert!(matches!(err, TtsError::Backend(msg) if msg.contains("espeak-ng")));
    }
}
