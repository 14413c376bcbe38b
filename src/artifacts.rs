//! Resolution of remote model artifacts into a local cache.
//!
//! Voice profile paths may point at an object store (`s3://bucket/key`). Such
//! references are downloaded once into `{cache_dir}/{key}.{hash}` where `hash`
//! is the first 8 hex characters of the SHA-256 of the full URI; every later
//! call returns the cached path. Plain filesystem paths pass through untouched.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::config::StorageSettings;

const OBJECT_SCHEME: &str = "s3://";

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("Invalid object URI '{0}'")]
    InvalidUri(String),
    #[error("Fetching {uri} failed: {message}")]
    Fetch { uri: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bucket and key of an object-store reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// Parse `s3://bucket/key`. Returns `None` for anything else.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix(OBJECT_SCHEME)?;
        let (bucket, key) = rest.split_once('/')?;
        let key = key.trim_start_matches('/');
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Downloads one object to a local file.
pub trait ObjectFetcher: Send + Sync {
    fn fetch(&self, object: &ObjectRef, dest: &Path) -> Result<(), ArtifactError>;
}

/// Fetches objects over HTTP from `{endpoint}/{bucket}/{key}`.
///
/// Works with public or pre-authorised buckets on S3-compatible stores.
pub struct HttpObjectFetcher {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpObjectFetcher {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { endpoint, agent }
    }

    fn object_url(&self, object: &ObjectRef) -> String {
        format!("{}/{}/{}", self.endpoint, object.bucket, object.key)
    }
}

impl ObjectFetcher for HttpObjectFetcher {
    fn fetch(&self, object: &ObjectRef, dest: &Path) -> Result<(), ArtifactError> {
        let url = self.object_url(object);
        let response = self.agent.get(&url).call().map_err(|e| ArtifactError::Fetch {
            uri: url.clone(),
            message: e.to_string(),
        })?;

        let mut reader = response.into_reader();
        let mut file = File::create(dest)?;
        std::io::copy(&mut reader, &mut file)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Maps artifact references to local paths, downloading remote ones once.
pub struct ArtifactResolver {
    cache_dir: PathBuf,
    fetcher: Option<Box<dyn ObjectFetcher>>,
    fetch_lock: Mutex<()>,
}

impl ArtifactResolver {
    pub fn new(cache_dir: impl Into<PathBuf>, fetcher: Box<dyn ObjectFetcher>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher: Some(fetcher),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Resolver without an object store; only local paths and cache hits resolve.
    pub fn local_only(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            fetcher: None,
            fetch_lock: Mutex::new(()),
        }
    }

    /// Build a resolver from storage settings, creating the cache directory.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, ArtifactError> {
        std::fs::create_dir_all(&settings.cache_dir)?;
        let resolver = match settings.endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => Self::new(
                settings.cache_dir.clone(),
                Box::new(HttpObjectFetcher::new(
                    endpoint,
                    Duration::from_secs(settings.timeout_secs),
                )),
            ),
            _ => {
                log::warn!("No object store endpoint configured; remote artifacts cannot be fetched");
                Self::local_only(settings.cache_dir.clone())
            }
        };
        Ok(resolver)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache location for a remote URI: `{cache_dir}/{key}.{8 hex of sha256(uri)}`.
    pub fn cache_path_for_uri(&self, uri: &str) -> Result<PathBuf, ArtifactError> {
        let object = ObjectRef::parse(uri).ok_or_else(|| ArtifactError::InvalidUri(uri.to_string()))?;
        let key = sanitize_key(&object.key);
        if key.is_empty() {
            return Err(ArtifactError::InvalidUri(uri.to_string()));
        }
        Ok(self.cache_dir.join(format!("{}.{}", key, short_hash(uri))))
    }

    /// Return a local path for `path_or_uri`, fetching remote objects on first use.
    pub fn resolve(&self, path_or_uri: &str) -> Result<PathBuf, ArtifactError> {
        if !path_or_uri.starts_with(OBJECT_SCHEME) {
            return Ok(PathBuf::from(path_or_uri));
        }

        let local = self.cache_path_for_uri(path_or_uri)?;
        if local.exists() {
            log::debug!("Artifact cache hit: {} -> {}", path_or_uri, local.display());
            return Ok(local);
        }

        let _guard = self
            .fetch_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if local.exists() {
            return Ok(local);
        }

        let fetcher = self.fetcher.as_ref().ok_or_else(|| ArtifactError::Fetch {
            uri: path_or_uri.to_string(),
            message: "no object store configured".to_string(),
        })?;
        let object = ObjectRef::parse(path_or_uri)
            .ok_or_else(|| ArtifactError::InvalidUri(path_or_uri.to_string()))?;

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let download = download_path(&local);
        log::info!("Fetching {} into {}", path_or_uri, local.display());
        if let Err(e) = fetcher.fetch(&object, &download) {
            let _ = std::fs::remove_file(&download);
            return Err(e);
        }
        std::fs::rename(&download, &local)?;

        Ok(local)
    }
}

fn short_hash(uri: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// Keep the key's directory structure but drop empty, `.` and `..` segments.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/")
}

fn download_path(local: &Path) -> PathBuf {
    let mut name = local.file_name().unwrap_or_default().to_os_string();
    name.push(".download");
    local.with_file_name(name)
}
