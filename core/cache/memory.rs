use super::{ArtifactCache, ArtifactSet, CacheError};
use crate::model::RuleKey;
use async_trait::async_trait;
use dashmap::DashMap;

/// A cache that lives as long as the process does.
#[derive(Debug, Default)]
pub struct InMemoryArtifactCache {
    entries: DashMap<RuleKey, ArtifactSet>,
}

impl InMemoryArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &RuleKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ArtifactCache for InMemoryArtifactCache {
    async fn lookup(&self, key: &RuleKey) -> Result<Option<ArtifactSet>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn store(&self, key: &RuleKey, artifacts: &ArtifactSet) -> Result<(), CacheError> {
        self.entries
            .entry(*key)
            .or_insert_with(|| artifacts.clone());
        Ok(())
    }
}
