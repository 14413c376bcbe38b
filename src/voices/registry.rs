use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::artifacts::ArtifactResolver;
use crate::config::VoiceProfileConfig;
use crate::error::TtsError;
use crate::{BackendLoader, Conditioning, SpeechBackend};

use super::ProfileArtifacts;

/// A loaded voice: its backend plus the conditioning computed at startup.
pub struct VoiceProfile<B> {
    pub name: String,
    pub backend: B,
    pub conditioning: Conditioning,
    /// Language override for this voice.
    pub language: Option<String>,
}

/// Outcome of initialising one configured profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileStatus {
    pub name: String,
    pub loaded: bool,
    pub error: Option<String>,
}

/// Immutable set of loaded voice profiles with default-voice fallback.
///
/// Built once at startup and shared read-only afterwards (usually behind an
/// `Arc`). Profiles that failed to load are simply absent.
pub struct VoiceRegistry<B> {
    profiles: HashMap<String, VoiceProfile<B>>,
    default_voice: String,
}

impl<B: SpeechBackend> VoiceRegistry<B> {
    /// Load every configured profile. A failing profile is logged and
    /// skipped; the others still load.
    pub fn initialize<L>(
        configs: &[VoiceProfileConfig],
        default_voice: &str,
        loader: &L,
        resolver: &ArtifactResolver,
    ) -> (Self, Vec<ProfileStatus>)
    where
        L: BackendLoader<Backend = B>,
    {
        let mut profiles = HashMap::new();
        let mut statuses = Vec::with_capacity(configs.len());
        let mut seen = HashSet::new();

        for config in configs {
            // First occurrence of a name wins, whether or not it loads.
            if !seen.insert(config.name.as_str()) {
                log::warn!("Duplicate voice profile '{}' ignored", config.name);
                continue;
            }

            log::info!("Loading voice profile '{}'", config.name);
            match load_profile(config, loader, resolver) {
                Ok(profile) => {
                    log::info!("Voice profile '{}' ready", config.name);
                    profiles.insert(config.name.clone(), profile);
                    statuses.push(ProfileStatus {
                        name: config.name.clone(),
                        loaded: true,
                        error: None,
                    });
                }
                Err(e) => {
                    log::error!("Voice profile '{}' failed to load: {}", config.name, e);
                    statuses.push(ProfileStatus {
                        name: config.name.clone(),
                        loaded: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if !profiles.contains_key(default_voice) {
            log::warn!("Default voice '{}' is not loaded", default_voice);
        }

        (Self::from_profiles(profiles.into_values(), default_voice), statuses)
    }
}

impl<B> VoiceRegistry<B> {
    /// Build a registry from already loaded profiles.
    pub fn from_profiles<I>(profiles: I, default_voice: &str) -> Self
    where
        I: IntoIterator<Item = VoiceProfile<B>>,
    {
        Self {
            profiles: profiles
                .into_iter()
                .map(|profile| (profile.name.clone(), profile))
                .collect(),
            default_voice: default_voice.to_string(),
        }
    }

    /// Look up `name`, falling back to the default voice.
    pub fn get(&self, name: &str) -> Result<&VoiceProfile<B>, TtsError> {
        if let Some(profile) = self.profiles.get(name) {
            return Ok(profile);
        }
        match self.profiles.get(&self.default_voice) {
            Some(profile) => {
                log::warn!(
                    "Voice '{}' not available, using default '{}'",
                    name,
                    self.default_voice
                );
                Ok(profile)
            }
            None => Err(TtsError::VoiceNotFound {
                requested: name.to_string(),
                default: self.default_voice.clone(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    /// Names of the loaded profiles, sorted.
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn load_profile<L: BackendLoader>(
    config: &VoiceProfileConfig,
    loader: &L,
    resolver: &ArtifactResolver,
) -> Result<VoiceProfile<L::Backend>, TtsError> {
    let artifacts = ProfileArtifacts::resolve(config, resolver)?;
    let backend = loader.load(&artifacts)?;
    let conditioning = backend.condition(&artifacts.reference)?;
    Ok(VoiceProfile {
        name: config.name.clone(),
        backend,
        conditioning,
        language: config.language.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SynthesisParams;
    use std::path::Path;

    struct ToneBackend {
        level: f32,
    }

    impl SpeechBackend for ToneBackend {
        fn sample_rate(&self) -> u32 {
            24000
        }

        fn condition(&self, reference: &Path) -> Result<Conditioning, TtsError> {
            let bytes = std::fs::read(reference)?;
            Ok(Conditioning {
                latent: vec![bytes.len() as f32],
                speaker_embedding: vec![self.level],
            })
        }

        fn synthesize(
            &self,
            text: &str,
            _conditioning: &Conditioning,
            _params: &SynthesisParams,
        ) -> Result<Vec<f32>, TtsError> {
            Ok(vec![self.level; text.chars().count()])
        }
    }

    struct ToneLoader;

    impl BackendLoader for ToneLoader {
        type Backend = ToneBackend;

        fn load(&self, artifacts: &ProfileArtifacts) -> Result<ToneBackend, TtsError> {
            let raw = std::fs::read_to_string(&artifacts.config)?;
            let level = raw
                .trim()
                .parse::<f32>()
                .map_err(|e| TtsError::Config(e.to_string()))?;
            Ok(ToneBackend { level })
        }
    }

    fn profile_config(dir: &Path, name: &str, level: &str) -> VoiceProfileConfig {
        let config = dir.join(format!("{name}.cfg"));
        let reference = dir.join(format!("{name}.ref"));
        std::fs::write(&config, level).unwrap();
        std::fs::write(&reference, b"abcd").unwrap();
        VoiceProfileConfig {
            name: name.to_string(),
            model: dir.join("model.onnx").to_string_lossy().into_owned(),
            config: config.to_string_lossy().into_owned(),
            tokenizer: None,
            reference: reference.to_string_lossy().into_owned(),
            language: None,
        }
    }

    #[test]
    fn failed_profile_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::local_only(dir.path().join("cache"));
        let configs = vec![
            profile_config(dir.path(), "normal", "0.5"),
            profile_config(dir.path(), "serious", "not a number"),
        ];

        let (registry, statuses) = VoiceRegistry::initialize(&configs, "normal", &ToneLoader, &resolver);

        assert_eq!(registry.available(), ["normal"]);
        assert!(statuses[0].loaded);
        assert!(!statuses[1].loaded);
        assert!(statuses[1].error.is_some());

        let normal = registry.get("normal").unwrap();
        assert_eq!(normal.conditioning.latent, [4.0]);
        assert_eq!(normal.conditioning.speaker_embedding, [0.5]);
    }

    #[test]
    fn missing_voice_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::local_only(dir.path().join("cache"));
        let configs = vec![profile_config(dir.path(), "normal", "0.25")];
        let (registry, _) = VoiceRegistry::initialize(&configs, "normal", &ToneLoader, &resolver);

        assert_eq!(registry.get("serious").unwrap().name, "normal");
    }

    #[test]
    fn missing_default_is_a_configuration_failure() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::local_only(dir.path().join("cache"));
        let configs = vec![profile_config(dir.path(), "serious", "0.25")];
        let (registry, _) = VoiceRegistry::initialize(&configs, "normal", &ToneLoader, &resolver);

        assert!(registry.get("serious").is_ok());
        let err = registry.get("unknown").err().unwrap();
        assert!(matches!(err, TtsError::VoiceNotFound { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn unreachable_remote_artifacts_fail_only_that_profile() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::local_only(dir.path().join("cache"));
        let mut remote = profile_config(dir.path(), "serious", "0.9");
        remote.model = "s3://models/serious/model.onnx".to_string();
        let configs = vec![profile_config(dir.path(), "normal", "0.1"), remote];

        let (registry, statuses) = VoiceRegistry::initialize(&configs, "normal", &ToneLoader, &resolver);

        assert!(registry.contains("normal"));
        assert!(!registry.contains("serious"));
        assert!(statuses[1].error.as_deref().unwrap().contains("s3://models/serious/model.onnx"));
    }

    #[test]
    fn duplicate_names_keep_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::local_only(dir.path().join("cache"));
        let first = profile_config(dir.path(), "normal", "0.1");
        let mut second = first.clone();
        second.config = dir.path().join("missing.cfg").to_string_lossy().into_owned();

        let (registry, statuses) =
            VoiceRegistry::initialize(&[first, second], "normal", &ToneLoader, &resolver);

        assert_eq!(statuses.len(), 1);
        assert_eq!(registry.get("normal").unwrap().conditioning.speaker_embedding, [0.1]);
    }

    #[test]
    fn failed_first_duplicate_still_shadows_later_ones() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::local_only(dir.path().join("cache"));
        let working = profile_config(dir.path(), "normal", "0.7");
        let mut broken = working.clone();
        broken.config = dir.path().join("missing.cfg").to_string_lossy().into_owned();

        let (registry, statuses) =
            VoiceRegistry::initialize(&[broken, working], "normal", &ToneLoader, &resolver);

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "normal");
        assert!(!statuses[0].loaded);
        assert!(registry.is_empty());
    }
}
