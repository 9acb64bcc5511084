use crate::model::RuleKey;
use std::path::{Path, PathBuf};
use thiserror::*;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Artifact path {0:?} must be relative and stay inside its output directory")]
    InvalidArtifactPath(PathBuf),

    #[error("Cache I/O error at {path:?}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Cache entry {key} is corrupt: {reason}")]
    Corrupt { key: RuleKey, reason: String },

    #[error("Could not parse the cache manifest at {path:?}: {err}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },

    #[error("Could not serialize the cache manifest of {key}: {err}")]
    ManifestSerialize {
        key: RuleKey,
        #[source]
        err: serde_json::Error,
    },

    #[error(transparent)]
    Backend(anyhow::Error),
}

impl CacheError {
    pub(crate) fn io<P: AsRef<Path>>(path: P) -> impl FnOnce(std::io::Error) -> CacheError {
        let path = path.as_ref().to_path_buf();
        move |err| CacheError::Io { path, err }
    }
}

impl From<anyhow::Error> for CacheError {
    fn from(err: anyhow::Error) -> Self {
        CacheError::Backend(err)
    }
}
