//! Named voice profiles and their startup-time loading.

mod registry;

pub use registry::{ProfileStatus, VoiceProfile, VoiceRegistry};

use std::path::PathBuf;

use crate::artifacts::{ArtifactError, ArtifactResolver};
use crate::config::VoiceProfileConfig;

/// Local paths of everything one voice profile needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileArtifacts {
    pub model: PathBuf,
    pub config: PathBuf,
    pub tokenizer: Option<PathBuf>,
    /// Reference sample the conditioning pair is derived from.
    pub reference: PathBuf,
}

impl ProfileArtifacts {
    /// Resolve every path of `config`, fetching remote objects into the cache.
    pub fn resolve(
        config: &VoiceProfileConfig,
        resolver: &ArtifactResolver,
    ) -> Result<Self, ArtifactError> {
        Ok(Self {
            model: resolver.resolve(&config.model)?,
            config: resolver.resolve(&config.config)?,
            tokenizer: config
                .tokenizer
                .as_deref()
                .map(|t| resolver.resolve(t))
                .transpose()?,
            reference: resolver.resolve(&config.reference)?,
        })
    }
}
