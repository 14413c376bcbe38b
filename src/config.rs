//! Service configuration.
//!
//! Settings come from an optional JSON file (every field has a default) and
//! are then overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TtsError;
use crate::llm::{ChatClientConfig, RewriterConfig};
use crate::pipeline::PipelineConfig;
use crate::SynthesisParams;

/// Environment variable naming the settings file when no path is given.
pub const CONFIG_PATH_ENV: &str = "DIALECT_TTS_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub tts: TtsSettings,
    pub voices: Vec<VoiceProfileConfig>,
    pub storage: StorageSettings,
    pub publisher: PublisherSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            tts: TtsSettings::default(),
            voices: default_voices(),
            storage: StorageSettings::default(),
            publisher: PublisherSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `$DIALECT_TTS_CONFIG`), then apply
    /// environment overrides. Without any file the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, TtsError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut settings = match path {
            Some(path) => {
                log::info!("Loading settings from {}", path.display());
                Self::from_json(&std::fs::read_to_string(&path)?)?
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_json(raw: &str) -> Result<Self, TtsError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply environment-style overrides. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(dir) = get("TTS_S3_CACHE") {
            self.storage.cache_dir = PathBuf::from(dir);
        }
        if let Some(endpoint) = get("MINIO_ENDPOINT") {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(dir) = get("TTS_OUTPUT_DIR") {
            self.tts.output_dir = PathBuf::from(dir);
        }
    }
}

/// Chat service connection, models and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub generator_model: String,
    pub validator_model: String,
    pub classifier_model: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub dialect: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let client = ChatClientConfig::default();
        let rewriter = RewriterConfig::default();
        Self {
            base_url: client.base_url,
            api_key: None,
            generator_model: rewriter.generator_model,
            validator_model: rewriter.validator_model.clone(),
            classifier_model: rewriter.validator_model,
            max_retries: rewriter.max_retries,
            retry_delay_ms: rewriter.retry_delay.as_millis() as u64,
            timeout_secs: client.timeout.as_secs(),
            temperature: client.temperature,
            max_tokens: client.max_tokens,
            top_p: client.top_p,
            dialect: rewriter.dialect,
        }
    }
}

impl LlmSettings {
    pub fn client_config(&self) -> ChatClientConfig {
        ChatClientConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        }
    }

    pub fn rewriter_config(&self) -> RewriterConfig {
        RewriterConfig {
            generator_model: self.generator_model.clone(),
            validator_model: self.validator_model.clone(),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            dialect: self.dialect.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub output_dir: PathBuf,
    pub default_voice: String,
    /// Voice used for serious-toned articles; `None` always uses the default.
    pub serious_voice: Option<String>,
    pub fade_ms: u32,
    /// Upper bound on concurrent chunk syntheses per request.
    pub workers: usize,
    /// Overrides the backend's own safe chunk length when set.
    pub max_chunk_chars: Option<usize>,
    pub params: SynthesisParams,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("tts_model/audio_outputs"),
            default_voice: "normal".to_string(),
            serious_voice: Some("serious".to_string()),
            fade_ms: crate::audio::DEFAULT_FADE_MS,
            workers: 4,
            max_chunk_chars: None,
            params: SynthesisParams::default(),
        }
    }
}

impl TtsSettings {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            output_dir: self.output_dir.clone(),
            fade_ms: self.fade_ms,
            workers: self.workers,
            max_chunk_chars: self.max_chunk_chars,
            params: self.params.clone(),
        }
    }
}

/// One named voice. Paths may be local or `s3://bucket/key` references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfileConfig {
    pub name: String,
    pub model: String,
    pub config: String,
    #[serde(default)]
    pub tokenizer: Option<String>,
    pub reference: String,
    /// Per-voice language tag; falls back to the synthesis params.
    #[serde(default)]
    pub language: Option<String>,
}

impl VoiceProfileConfig {
    /// Conventional layout under `tts_model/{name}/`.
    pub fn under(root: &Path, name: &str) -> Self {
        let dir = root.join(name);
        let path = |file: &str| dir.join(file).to_string_lossy().into_owned();
        Self {
            name: name.to_string(),
            model: path("model.onnx"),
            config: path("config.json"),
            tokenizer: None,
            reference: path("style.npy"),
            language: None,
        }
    }
}

fn default_voices() -> Vec<VoiceProfileConfig> {
    let root = Path::new("tts_model");
    vec![
        VoiceProfileConfig::under(root, "normal"),
        VoiceProfileConfig::under(root, "serious"),
    ]
}

/// Object-store access for remote artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub endpoint: Option<String>,
    pub cache_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            cache_dir: PathBuf::from(".cache/tts-model"),
            timeout_secs: 300,
        }
    }
}

/// Labels stamped on produced episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    pub name: String,
    pub category: String,
    /// Articles processed concurrently by a batch.
    pub workers: usize,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            name: "AlRiyadh".to_string(),
            category: "news".to_string(),
            workers: 2,
        }
    }
}
