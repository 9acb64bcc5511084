use super::{ArtifactCache, ArtifactSet, CacheError};
use crate::model::RuleKey;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::*;

/// Layers several caches, fastest first. A typical setup is a local `DirArtifactCache` in front
/// of a remote backend.
///
/// Lookups try every level in order, and copy hits back into the levels that missed. Stores go
/// to every level.
///
#[derive(Default, Clone)]
pub struct TieredArtifactCache {
    levels: Vec<Arc<dyn ArtifactCache>>,
}

impl TieredArtifactCache {
    pub fn new(levels: Vec<Arc<dyn ArtifactCache>>) -> Self {
        Self { levels }
    }

    pub fn with_level<C: ArtifactCache + 'static>(mut self, level: C) -> Self {
        self.levels.push(Arc::new(level));
        self
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl std::fmt::Debug for TieredArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredArtifactCache")
            .field("levels", &self.levels.len())
            .finish()
    }
}

#[async_trait]
impl ArtifactCache for TieredArtifactCache {
    #[tracing::instrument(name = "TieredArtifactCache::lookup", skip(self))]
    async fn lookup(&self, key: &RuleKey) -> Result<Option<ArtifactSet>, CacheError> {
        let mut last_error = None;

        for (level, cache) in self.levels.iter().enumerate() {
            match cache.lookup(key).await {
                Ok(Some(artifacts)) => {
                    for missed in &self.levels[..level] {
                        if let Err(err) = missed.store(key, &artifacts).await {
                            warn!("Could not back-fill {} into cache level: {}", key, err);
                        }
                    }
                    return Ok(Some(artifacts));
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!("Cache level #{} failed to look up {}: {}", level, key, err);
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    #[tracing::instrument(name = "TieredArtifactCache::store", skip(self, artifacts))]
    async fn store(&self, key: &RuleKey, artifacts: &ArtifactSet) -> Result<(), CacheError> {
        let mut first_error = None;

        for (level, cache) in self.levels.iter().enumerate() {
            if let Err(err) = cache.store(key, artifacts).await {
                warn!("Cache level #{} failed to store {}: {}", level, key, err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
