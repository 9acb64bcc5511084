//! # The Artifact Cache
//!
//! Maps a `RuleKey` to the artifacts a rule produced the last time it was built with that key.
//!
//! Every backend implements `ArtifactCache`. Lookups and stores for different keys never
//! interfere, and a lookup racing a store of the same key sees either nothing or the complete
//! entry.
//!
mod artifact_set;
mod dir;
mod error;
mod manifest;
mod memory;
mod tiered;

pub use artifact_set::*;
pub use dir::*;
pub use error::*;
pub use manifest::*;
pub use memory::*;
pub use tiered::*;

use crate::model::RuleKey;
use async_trait::async_trait;

#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// The artifacts stored under `key`, if there are any.
    async fn lookup(&self, key: &RuleKey) -> Result<Option<ArtifactSet>, CacheError>;

    /// Store `artifacts` under `key`. Storing a key that is already present is not an error.
    async fn store(&self, key: &RuleKey, artifacts: &ArtifactSet) -> Result<(), CacheError>;
}

/// A cache that never has anything in it. Used when caching is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopArtifactCache;

#[async_trait]
impl ArtifactCache for NoopArtifactCache {
    async fn lookup(&self, _key: &RuleKey) -> Result<Option<ArtifactSet>, CacheError> {
        Ok(None)
    }

    async fn store(&self, _key: &RuleKey, _artifacts: &ArtifactSet) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_noop_cache_forgets_everything() {
        let key = RuleKey::from_bytes([7; 32]);
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("a.txt", "a").unwrap();

        NoopArtifactCache.store(&key, &artifacts).await.unwrap();
        assert!(NoopArtifactCache.lookup(&key).await.unwrap().is_none());
    }
}
