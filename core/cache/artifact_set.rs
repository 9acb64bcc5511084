use super::CacheError;
use crate::util::fs::is_safe_relative;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// The files a rule produced, keyed by their path relative to the rule's `gen` directory.
///
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<P, C>(&mut self, path: P, contents: C) -> Result<(), CacheError>
    where
        P: Into<PathBuf>,
        C: Into<Vec<u8>>,
    {
        let path = path.into();
        if !is_safe_relative(&path) {
            return Err(CacheError::InvalidArtifactPath(path));
        }
        self.files.insert(path, contents.into());
        Ok(())
    }

    pub fn get<P: AsRef<Path>>(&self, path: P) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &[u8])> {
        self.files
            .iter()
            .map(|(path, contents)| (path.as_path(), contents.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|c| c.len() as u64).sum()
    }

    /// Read every artifact into a set. Artifacts must be absolute paths under `root`, and
    /// directories are read recursively.
    pub async fn collect(root: &Path, artifacts: &[PathBuf]) -> Result<Self, CacheError> {
        let mut set = Self::new();
        let mut pending: Vec<PathBuf> = artifacts.to_vec();

        while let Some(path) = pending.pop() {
            if path.strip_prefix(root).is_err() {
                return Err(CacheError::InvalidArtifactPath(path));
            }

            let metadata = fs::metadata(&path).await.map_err(CacheError::io(&path))?;
            if metadata.is_dir() {
                let mut entries = fs::read_dir(&path).await.map_err(CacheError::io(&path))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(CacheError::io(&path))?
                {
                    pending.push(entry.path());
                }
                continue;
            }

            let contents = fs::read(&path).await.map_err(CacheError::io(&path))?;
            let relative = path
                .strip_prefix(root)
                .map_err(|_| CacheError::InvalidArtifactPath(path.clone()))?;
            set.insert(relative, contents)?;
        }

        Ok(set)
    }

    /// Write every file of the set under `root`, creating directories as needed.
    pub async fn materialize(&self, root: &Path) -> Result<(), CacheError> {
        for (relative, contents) in &self.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(CacheError::io(parent))?;
            }
            fs::write(&path, contents)
                .await
                .map_err(CacheError::io(&path))?;
        }
        Ok(())
    }
}
