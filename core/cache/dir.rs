use super::{ArtifactCache, ArtifactManifest, ArtifactSet, CacheError, MANIFEST_FILE};
use crate::model::RuleKey;
use crate::util::fs::is_safe_relative;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::*;

pub const STAGING_DIR: &str = ".staging";

pub const OUTS_DIR: &str = "outs";

/// A content-addressed cache on the local filesystem.
///
/// Entries live in `<root>/<first 2 hex chars>/<hex key>/`, holding a `Manifest.json` and the
/// artifacts under `outs/`. Entries are written in full under `<root>/.staging/` and published
/// with a single directory rename, so readers never see a partial entry.
///
#[derive(Debug, Clone)]
pub struct DirArtifactCache {
    root: PathBuf,
}

impl DirArtifactCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, key: &RuleKey) -> PathBuf {
        let hex = key.to_hex();
        self.root.join(&hex[..2]).join(hex)
    }

    async fn read_entry(&self, key: &RuleKey, dir: &Path) -> Result<Option<ArtifactSet>, CacheError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let bytes = match fs::read(&manifest_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(CacheError::Io {
                    path: manifest_path,
                    err,
                })
            }
        };

        let manifest: ArtifactManifest =
            serde_json::from_slice(&bytes).map_err(|err| CacheError::ManifestParse {
                path: manifest_path.clone(),
                err,
            })?;

        if manifest.rule_key() != *key {
            return Err(CacheError::Corrupt {
                key: *key,
                reason: format!("its manifest belongs to {}", manifest.rule_key()),
            });
        }

        let outs = dir.join(OUTS_DIR);
        let mut artifacts = ArtifactSet::new();
        for entry in manifest.files() {
            if !is_safe_relative(&entry.path) {
                return Err(CacheError::Corrupt {
                    key: *key,
                    reason: format!("it records an unsafe path {:?}", entry.path),
                });
            }
            let path = outs.join(&entry.path);
            let contents = fs::read(&path).await.map_err(|err| CacheError::Corrupt {
                key: *key,
                reason: format!("could not read {:?}: {}", path, err),
            })?;
            manifest.verify(entry, &contents)?;
            artifacts.insert(entry.path.clone(), contents)?;
        }

        Ok(Some(artifacts))
    }

    async fn stage(
        &self,
        staging: &Path,
        key: &RuleKey,
        artifacts: &ArtifactSet,
    ) -> Result<(), CacheError> {
        let outs = staging.join(OUTS_DIR);
        fs::create_dir_all(&outs)
            .await
            .map_err(CacheError::io(&outs))?;
        artifacts.materialize(&outs).await?;

        let manifest = ArtifactManifest::for_artifacts(*key, artifacts);
        let manifest_path = staging.join(MANIFEST_FILE);
        fs::write(&manifest_path, manifest.to_json()?)
            .await
            .map_err(CacheError::io(&manifest_path))
    }

    async fn is_present(&self, dir: &Path) -> bool {
        fs::try_exists(dir.join(MANIFEST_FILE))
            .await
            .unwrap_or(false)
    }
}

#[async_trait]
impl ArtifactCache for DirArtifactCache {
    #[tracing::instrument(name = "DirArtifactCache::lookup", skip(self))]
    async fn lookup(&self, key: &RuleKey) -> Result<Option<ArtifactSet>, CacheError> {
        let dir = self.entry_dir(key);
        match self.read_entry(key, &dir).await {
            Err(err @ (CacheError::Corrupt { .. } | CacheError::ManifestParse { .. })) => {
                warn!("Evicting corrupt cache entry {}: {}", key, err);
                if let Err(rm_err) = fs::remove_dir_all(&dir).await {
                    warn!("Could not evict {:?}: {}", dir, rm_err);
                }
                Err(err)
            }
            result => result,
        }
    }

    #[tracing::instrument(name = "DirArtifactCache::store", skip(self, artifacts))]
    async fn store(&self, key: &RuleKey, artifacts: &ArtifactSet) -> Result<(), CacheError> {
        let dir = self.entry_dir(key);
        if self.is_present(&dir).await {
            debug!("{} is already cached", key);
            return Ok(());
        }

        let staging = self
            .root
            .join(STAGING_DIR)
            .join(uuid::Uuid::new_v4().to_string());

        let published = async {
            self.stage(&staging, key, artifacts).await?;

            if let Some(parent) = dir.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(CacheError::io(parent))?;
            }

            let mut outcome = fs::rename(&staging, &dir).await;
            let incomplete =
                !self.is_present(&dir).await && fs::try_exists(&dir).await.unwrap_or(false);
            if outcome.is_err() && incomplete {
                warn!("Replacing incomplete cache entry {:?}", dir);
                fs::remove_dir_all(&dir)
                    .await
                    .map_err(CacheError::io(&dir))?;
                outcome = fs::rename(&staging, &dir).await;
            }

            match outcome {
                Ok(()) => Ok(()),
                // Somebody else published this key first, and their entry is just as good.
                Err(_) if self.is_present(&dir).await => {
                    debug!("Lost the race to publish {}", key);
                    Ok(())
                }
                Err(err) => Err(CacheError::Io {
                    path: dir.clone(),
                    err,
                }),
            }
        }
        .await;

        if fs::try_exists(&staging).await.unwrap_or(false) {
            if let Err(err) = fs::remove_dir_all(&staging).await {
                warn!("Could not clean up staging directory {:?}: {}", staging, err);
            }
        }

        published
    }
}
