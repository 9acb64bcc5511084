use super::{ArtifactSet, CacheError};
use crate::model::RuleKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const MANIFEST_FILE: &str = "Manifest.json";

pub const MANIFEST_VERSION: u32 = 1;

/// Describes a cache entry: which files it holds, and what they must hash to.
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    version: u32,

    rule_key: RuleKey,

    #[serde(with = "crate::util::serde::iso8601")]
    created_at: DateTime<Utc>,

    files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub sha256: String,
    pub size: u64,
}

impl ArtifactManifest {
    pub fn for_artifacts(key: RuleKey, artifacts: &ArtifactSet) -> Self {
        let files = artifacts
            .files()
            .map(|(path, contents)| ManifestEntry {
                path: path.to_path_buf(),
                sha256: sha256_hex(contents),
                size: contents.len() as u64,
            })
            .collect();

        Self {
            version: MANIFEST_VERSION,
            rule_key: key,
            created_at: Utc::now(),
            files,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn rule_key(&self) -> RuleKey {
        self.rule_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn files(&self) -> &[ManifestEntry] {
        &self.files
    }

    /// Check that `contents` is what this manifest recorded for `entry`.
    pub fn verify(&self, entry: &ManifestEntry, contents: &[u8]) -> Result<(), CacheError> {
        if contents.len() as u64 != entry.size {
            return Err(CacheError::Corrupt {
                key: self.rule_key,
                reason: format!(
                    "{:?} should be {} bytes long but is {}",
                    entry.path,
                    entry.size,
                    contents.len()
                ),
            });
        }
        if sha256_hex(contents) != entry.sha256 {
            return Err(CacheError::Corrupt {
                key: self.rule_key,
                reason: format!("{:?} does not match its recorded hash", entry.path),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec_pretty(self).map_err(|err| CacheError::ManifestSerialize {
            key: self.rule_key,
            err,
        })
    }
}

pub(crate) fn sha256_hex(contents: &[u8]) -> String {
    let mut s = Sha256::new();
    s.update(contents);
    format!("{:x}", s.finalize())
}
