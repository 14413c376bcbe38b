//! Text → chunked synthesis → stitched WAV file.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::audio::{combine, AudioSegment, Waveform, DEFAULT_FADE_MS};
use crate::error::TtsError;
use crate::text::{Chunker, TextChunk};
use crate::voices::VoiceRegistry;
use crate::{SpeechBackend, SynthesisParams};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub fade_ms: u32,
    /// Concurrent chunk syntheses.
    pub workers: usize,
    /// Overrides the backend's safe chunk length.
    pub max_chunk_chars: Option<usize>,
    pub params: SynthesisParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("tts_model/audio_outputs"),
            fade_ms: DEFAULT_FADE_MS,
            workers: 4,
            max_chunk_chars: None,
            params: SynthesisParams::default(),
        }
    }
}

/// A finished audio artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub path: PathBuf,
    /// Whole seconds, floored.
    pub duration_secs: u64,
    /// Profile that actually rendered the audio (after fallback).
    pub voice: String,
    pub chunks: usize,
}

/// In-memory result of [`SynthesisPipeline::render`].
#[derive(Debug, Clone)]
pub struct Rendering {
    pub waveform: Waveform,
    pub voice: String,
    pub chunks: Vec<TextChunk>,
}

/// Composes the chunker, the voice registry and the stitcher.
pub struct SynthesisPipeline<B> {
    registry: Arc<VoiceRegistry<B>>,
    chunker: Chunker,
    pool: rayon::ThreadPool,
    config: PipelineConfig,
}

impl<B: SpeechBackend> SynthesisPipeline<B> {
    pub fn new(registry: Arc<VoiceRegistry<B>>, config: PipelineConfig) -> Result<Self, TtsError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers.max(1))
            .thread_name(|i| format!("tts-chunk-{i}"))
            .build()
            .map_err(|e| TtsError::Config(format!("chunk worker pool: {e}")))?;

        Ok(Self {
            registry,
            chunker: Chunker::new(),
            pool,
            config,
        })
    }

    /// Replace the chunker, e.g. with one backed by a linguistic splitter.
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn registry(&self) -> &VoiceRegistry<B> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Synthesize `text` with `voice` into `{output_dir}/{output_name}.wav`.
    ///
    /// Without a name one is generated (see [`artifact_name`]). Nothing is
    /// written unless every chunk synthesized successfully.
    pub fn synthesize(
        &self,
        text: &str,
        voice: &str,
        output_name: Option<&str>,
    ) -> Result<Rendered, TtsError> {
        let name = match output_name {
            Some(name) => validate_name(name)?.to_string(),
            None => artifact_name(text),
        };

        let rendering = self.render(text, voice)?;

        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.config.output_dir.join(format!("{name}.wav"));
        rendering.waveform.write_wav(&path)?;

        let duration_secs = rendering.waveform.whole_seconds();
        log::info!(
            "Audio saved: {} ({} s, voice '{}')",
            path.display(),
            duration_secs,
            rendering.voice
        );

        Ok(Rendered {
            path,
            duration_secs,
            voice: rendering.voice,
            chunks: rendering.chunks.len(),
        })
    }

    /// Synthesize and stitch without touching the filesystem.
    pub fn render(&self, text: &str, voice: &str) -> Result<Rendering, TtsError> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyInput);
        }

        let profile = self.registry.get(voice)?;
        let backend = &profile.backend;
        let max_chars = self
            .config
            .max_chunk_chars
            .unwrap_or_else(|| backend.max_chunk_chars());

        let chunks = self.chunker.segment(text, max_chars);
        if chunks.is_empty() {
            return Err(TtsError::EmptyInput);
        }
        log::info!("Synthesizing {} chunks with voice '{}'", chunks.len(), profile.name);

        let mut params = self.config.params.clone();
        if let Some(language) = &profile.language {
            params.language = language.clone();
        }

        let segments = self.pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| {
                    log::debug!("Chunk {} ({} chars)", chunk.index, chunk.char_len);
                    backend
                        .synthesize(&chunk.text, &profile.conditioning, &params)
                        .map(|samples| AudioSegment {
                            index: chunk.index,
                            samples,
                        })
                })
                .collect::<Result<Vec<_>, TtsError>>()
        })?;

        let waveform = combine(
            segments.into_iter().map(|segment| segment.samples),
            self.config.fade_ms,
            backend.sample_rate(),
        );
        if waveform.samples.is_empty() {
            return Err(TtsError::Backend("backend produced no audio".to_string()));
        }

        Ok(Rendering {
            waveform,
            voice: profile.name.clone(),
            chunks,
        })
    }
}

/// `audio_{YYYYmmdd_HHMMSS}_{8 hex}` where the hex part is derived from
/// `seed` and the current instant.
pub fn artifact_name(seed: &str) -> String {
    let now = Local::now();
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("audio_{}_{}", now.format("%Y%m%d_%H%M%S"), &digest[..8])
}

fn validate_name(name: &str) -> Result<&str, TtsError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
    {
        return Err(TtsError::Config(format!("invalid output name '{name}'")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::probe_duration;
    use crate::voices::VoiceProfile;
    use crate::Conditioning;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits `len(text) * 10` samples whose value is the chunk length.
    struct LengthBackend {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl LengthBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }
    }

    impl SpeechBackend for LengthBackend {
        fn sample_rate(&self) -> u32 {
            100
        }

        fn max_chunk_chars(&self) -> usize {
            40
        }

        fn condition(&self, _reference: &Path) -> Result<Conditioning, TtsError> {
            Ok(Conditioning::default())
        }

        fn synthesize(
            &self,
            text: &str,
            _conditioning: &Conditioning,
            params: &SynthesisParams,
        ) -> Result<Vec<f32>, TtsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(params.language, "ar");
            if let Some(marker) = self.fail_on {
                if text.contains(marker) {
                    return Err(TtsError::Backend("model rejected input".to_string()));
                }
            }
            let len = text.chars().count();
            Ok(vec![len as f32; len * 10])
        }
    }

    fn pipeline(dir: &Path, backend: LengthBackend, fade_ms: u32) -> SynthesisPipeline<LengthBackend> {
        let profile = VoiceProfile {
            name: "normal".to_string(),
            backend,
            conditioning: Conditioning::default(),
            language: None,
        };
        let registry = VoiceRegistry::from_profiles([profile], "normal");
        SynthesisPipeline::new(
            Arc::new(registry),
            PipelineConfig {
                output_dir: dir.to_path_buf(),
                fade_ms,
                workers: 3,
                ..Default::default()
            },
        )
        .unwrap()
    }

    const TEXT: &str = "الطقس اليوم حار جداً في الرياض. ينصح بشرب الماء! \
                        وتتوقع الأرصاد أمطاراً خفيفة غداً؟ انتهت النشرة.";

    #[test]
    fn writes_wav_and_reports_floor_duration() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), LengthBackend::new(), 0);

        let rendered = pipeline.synthesize(TEXT, "normal", Some("episode_1")).unwrap();

        assert_eq!(rendered.path, dir.path().join("episode_1.wav"));
        assert!(rendered.chunks >= 2);
        assert_eq!(rendered.voice, "normal");
        assert_eq!(probe_duration(&rendered.path).unwrap(), rendered.duration_secs);
    }

    #[test]
    fn chunks_are_stitched_in_original_order() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), LengthBackend::new(), 0);

        let rendering = pipeline.render(TEXT, "normal").unwrap();
        let expected: Vec<f32> = Chunker::new()
            .segment(TEXT, 40)
            .iter()
            .flat_map(|chunk| vec![chunk.char_len as f32; chunk.char_len * 10])
            .collect();

        assert_eq!(rendering.waveform.samples, expected);
        assert_eq!(
            pipeline.registry().get("normal").unwrap().backend.calls.load(Ordering::SeqCst),
            rendering.chunks.len()
        );
    }

    #[test]
    fn crossfade_shortens_output_per_seam() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), LengthBackend::new(), 50);

        let rendering = pipeline.render(TEXT, "normal").unwrap();
        let total: usize = rendering.chunks.iter().map(|c| c.char_len * 10).sum();
        // 50 ms at 100 Hz is 5 samples per seam.
        assert_eq!(rendering.waveform.samples.len(), total - 5 * (rendering.chunks.len() - 1));
    }

    #[test]
    fn unknown_voice_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), LengthBackend::new(), 0);
        let rendered = pipeline.synthesize("مرحبا", "serious", Some("x")).unwrap();
        assert_eq!(rendered.voice, "normal");
    }

    #[test]
    fn empty_text_is_rejected_before_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), LengthBackend::new(), 0);

        assert!(matches!(
            pipeline.synthesize("  \n\t", "normal", None),
            Err(TtsError::EmptyInput)
        ));
        assert_eq!(
            pipeline.registry().get("normal").unwrap().backend.calls.load(Ordering::SeqCst),
            0
        );
    }

    #[test]
    fn missing_default_voice_is_a_configuration_failure() {
        let dir = tempfile::tempdir().unwrap();
        let registry: VoiceRegistry<LengthBackend> = VoiceRegistry::from_profiles([], "normal");
        let pipeline = SynthesisPipeline::new(
            Arc::new(registry),
            PipelineConfig {
                output_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
        )
        .unwrap();

        let err = pipeline.synthesize("نص", "serious", None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn failed_chunk_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LengthBackend {
            calls: AtomicUsize::new(0),
            fail_on: Some("الأرصاد"),
        };
        let pipeline = pipeline(dir.path(), backend, 0);

        assert!(matches!(
            pipeline.synthesize(TEXT, "normal", Some("broken")),
            Err(TtsError::Backend(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn output_names_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), LengthBackend::new(), 0);
        assert!(matches!(
            pipeline.synthesize("نص", "normal", Some("../evil")),
            Err(TtsError::Config(_))
        ));
    }

    #[test]
    fn generated_names_follow_the_artifact_pattern() {
        let name = artifact_name("seed");
        let parts: Vec<&str> = name.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "audio");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
