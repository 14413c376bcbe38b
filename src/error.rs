use crate::artifacts::ArtifactError;

/// Errors raised while loading voices or turning text into audio.
#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Input text is empty after trimming")]
    EmptyInput,
    #[error("Voice profile '{requested}' is not available and default '{default}' is not loaded")]
    VoiceNotFound { requested: String, default: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Artifact resolution failed: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("Speech backend failed: {0}")]
    Backend(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TtsError {
    /// True for failures caused by missing voices, artifacts or settings.
    ///
    /// These are never retried: the same call would fail the same way.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TtsError::VoiceNotFound { .. } | TtsError::Config(_) | TtsError::Artifact(_)
        )
    }
}
