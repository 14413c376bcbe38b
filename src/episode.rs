//! Article → dialect script → audio → published episode record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::DateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PublisherSettings;
use crate::error::TtsError;
use crate::llm::{DialectRewriter, RewriteOutcome, TextService, ToneClassifier};
use crate::pipeline::{artifact_name, SynthesisPipeline};
use crate::voices::ProfileStatus;
use crate::SpeechBackend;

#[derive(thiserror::Error, Debug)]
pub enum EpisodeError {
    #[error("Invalid publication date '{0}'")]
    InvalidDate(String),
    #[error("Dialect rewrite failed: {0}")]
    Rewrite(String),
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] TtsError),
    #[error("Upload of {path} failed: {message}")]
    Store { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A scraped news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    /// Body text in Modern Standard Arabic.
    #[serde(alias = "description_fusha")]
    pub description: String,
    /// RFC 2822 publication date as found in RSS feeds.
    pub date: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Convert an RFC 2822 date (`Sun, 23 Nov 2025 00:16:15 +0300`) to RFC 3339.
pub fn parse_publication_date(raw: &str) -> Result<String, EpisodeError> {
    DateTime::parse_from_rfc2822(raw.trim())
        .map(|date| date.to_rfc3339())
        .map_err(|_| EpisodeError::InvalidDate(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMeta {
    pub title: String,
    pub category: String,
    pub author: Option<String>,
    pub publisher: String,
    pub publication_date: String,
    pub content_raw_url: String,
    pub script_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMeta {
    pub duration: u64,
    pub format: String,
    pub url_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeMeta {
    pub title: String,
    pub description: String,
    pub script_url_path: String,
    pub image_url: Option<String>,
}

/// Output shape consumed by the episode automation service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeRecord {
    pub article: ArticleMeta,
    pub audio: AudioMeta,
    pub episode: EpisodeMeta,
}

/// Destination for produced files.
pub trait ArtifactStore: Send + Sync {
    /// Store `local` under `destination` and return where it can be found.
    fn upload(&self, local: &Path, destination: &str) -> Result<String, EpisodeError>;

    /// Remote stores hold their own copy, so local files may be removed.
    fn is_remote(&self) -> bool {
        false
    }
}

/// Keeps artifacts where they were written and reports their local paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl ArtifactStore for LocalStore {
    fn upload(&self, local: &Path, _destination: &str) -> Result<String, EpisodeError> {
        Ok(local.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub episodes: Vec<EpisodeRecord>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.episodes.len()
    }
}

/// Which collaborators came up at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readiness {
    pub llm_ready: bool,
    pub voices: Vec<ProfileStatus>,
}

impl Readiness {
    pub fn new(service: &dyn TextService, voices: Vec<ProfileStatus>) -> Self {
        Self {
            llm_ready: service.is_ready(),
            voices,
        }
    }

    pub fn tts_ready(&self) -> bool {
        self.voices.iter().any(|status| status.loaded)
    }
}

/// Turns articles into episodes: rewrite, pick a voice, synthesize, store.
pub struct EpisodeProducer<B> {
    rewriter: DialectRewriter,
    classifier: Option<ToneClassifier>,
    serious_voice: Option<String>,
    pipeline: Arc<SynthesisPipeline<B>>,
    store: Box<dyn ArtifactStore>,
    publisher: PublisherSettings,
    pool: rayon::ThreadPool,
}

impl<B: SpeechBackend> EpisodeProducer<B> {
    pub fn new(
        rewriter: DialectRewriter,
        pipeline: Arc<SynthesisPipeline<B>>,
        store: Box<dyn ArtifactStore>,
        publisher: PublisherSettings,
    ) -> Result<Self, EpisodeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(publisher.workers.max(1))
            .thread_name(|i| format!("episode-{i}"))
            .build()
            .map_err(|e| EpisodeError::Config(format!("article worker pool: {e}")))?;

        Ok(Self {
            rewriter,
            classifier: None,
            serious_voice: None,
            pipeline,
            store,
            publisher,
            pool,
        })
    }

    /// Route serious-toned articles to `serious_voice`.
    pub fn with_classifier(mut self, classifier: ToneClassifier, serious_voice: Option<String>) -> Self {
        self.classifier = Some(classifier);
        self.serious_voice = serious_voice;
        self
    }

    fn pick_voice(&self, text: &str) -> &str {
        let default_voice = self.pipeline.registry().default_voice();
        match &self.classifier {
            Some(classifier) => {
                let tone = classifier.classify(text);
                log::info!("Article tone: {:?}", tone);
                tone.voice(default_voice, self.serious_voice.as_deref())
            }
            None => default_voice,
        }
    }

    /// Produce one episode. Local files are removed only after a remote
    /// store accepted all of them.
    pub fn produce(&self, article: &Article) -> Result<EpisodeRecord, EpisodeError> {
        let publication_date = parse_publication_date(&article.date)?;

        let script = match self.rewriter.rewrite(&article.description) {
            RewriteOutcome::Rewritten { text, attempts } => {
                log::info!("Dialect script ready after {} attempt(s)", attempts);
                text
            }
            RewriteOutcome::Exhausted { attempts } => {
                return Err(EpisodeError::Rewrite(format!(
                    "no validated rewrite after {attempts} attempts"
                )))
            }
            RewriteOutcome::Unavailable(reason) => return Err(EpisodeError::Rewrite(reason)),
            RewriteOutcome::EmptyInput => {
                return Err(EpisodeError::Rewrite("article has no text".to_string()))
            }
        };

        let voice = self.pick_voice(&article.description);
        let name = artifact_name(&article.title);
        let rendered = self.pipeline.synthesize(&script, voice, Some(&name))?;

        let output_dir = &self.pipeline.config().output_dir;
        let script_file = format!("{name}_script.txt");
        let content_file = format!("{name}_original.txt");
        let script_path = output_dir.join(&script_file);
        let content_path = output_dir.join(&content_file);
        write_texts(
            &rendered.path,
            [(&script_path, &script), (&content_path, &article.description)],
        )?;

        let (audio_url, audio_ok) = self.upload(&rendered.path, &format!("audio/{name}.wav"));
        let (script_url, script_ok) = self.upload(&script_path, &format!("scripts/{script_file}"));
        let (content_url, content_ok) = self.upload(&content_path, &format!("content/{content_file}"));

        if self.store.is_remote() && audio_ok && script_ok && content_ok {
            cleanup_local_files(&[rendered.path.clone(), script_path, content_path]);
        }

        Ok(EpisodeRecord {
            article: ArticleMeta {
                title: article.title.clone(),
                category: self.publisher.category.clone(),
                author: None,
                publisher: self.publisher.name.clone(),
                publication_date,
                content_raw_url: content_url,
                script_url: script_url.clone(),
            },
            audio: AudioMeta {
                duration: rendered.duration_secs,
                format: "wav".to_string(),
                url_path: audio_url,
            },
            episode: EpisodeMeta {
                title: article.title.clone(),
                description: format!("بودكاست: {}", article.title),
                script_url_path: script_url,
                image_url: None,
            },
        })
    }

    /// Upload, falling back to the local path when the store fails.
    fn upload(&self, local: &Path, destination: &str) -> (String, bool) {
        match self.store.upload(local, destination) {
            Ok(url) => (url, true),
            Err(e) => {
                log::warn!("{}; keeping local file", e);
                (local.to_string_lossy().into_owned(), false)
            }
        }
    }

    /// Process articles concurrently. A failing article is logged and
    /// recorded; it never stops the batch.
    pub fn produce_batch(&self, articles: &[Article]) -> BatchReport {
        let total = articles.len();
        log::info!("Processing {} articles", total);

        let results: Vec<Result<EpisodeRecord, EpisodeError>> = self.pool.install(|| {
            articles
                .par_iter()
                .enumerate()
                .map(|(index, article)| {
                    log::info!("Article {}/{}: {}", index + 1, total, article.title);
                    self.produce(article)
                })
                .collect()
        });

        let mut report = BatchReport {
            total,
            ..Default::default()
        };
        for (index, (article, result)) in articles.iter().zip(results).enumerate() {
            match result {
                Ok(record) => report.episodes.push(record),
                Err(e) => {
                    log::error!("Article {} ('{}') failed: {}", index + 1, article.title, e);
                    report.failures.push(BatchFailure {
                        index,
                        title: article.title.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        log::info!("Batch complete: {}/{} episodes created", report.processed(), total);
        report
    }
}

/// Write the episode's text files next to its audio. On failure nothing
/// of the episode is left behind, the audio included.
fn write_texts(audio: &Path, files: [(&PathBuf, &String); 2]) -> Result<(), EpisodeError> {
    for (path, contents) in files {
        if let Err(e) = std::fs::write(path, contents) {
            log::error!("Failed to write {}: {}", path.display(), e);
            let written: Vec<PathBuf> = std::iter::once(audio.to_path_buf())
                .chain(files.iter().map(|(p, _)| p.to_path_buf()))
                .filter(|p| p.is_file())
                .collect();
            cleanup_local_files(&written);
            return Err(e.into());
        }
    }
    Ok(())
}

fn cleanup_local_files(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}
