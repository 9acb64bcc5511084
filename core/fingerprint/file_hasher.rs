use super::field_value::write_bytes;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

pub type FileDigest = [u8; 32];

/// Hashes input files, remembering every digest it computes.
///
/// A `FileHasher` is meant to live for a single build: files are assumed not to change while a
/// build is running, but they will change in between builds.
///
#[derive(Debug, Default)]
pub struct FileHasher {
    digests: DashMap<PathBuf, FileDigest>,
}

impl FileHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The SHA-256 of a file's contents. Directories are hashed over their sorted entry names
    /// and the hashes of their entries, recursively.
    #[tracing::instrument(name = "FileHasher::hash", skip(self))]
    pub async fn hash(&self, path: &Path) -> io::Result<FileDigest> {
        if let Some(digest) = self.digests.get(path) {
            return Ok(*digest);
        }
        let digest = hash_path(path.to_path_buf()).await?;
        self.digests.insert(path.to_path_buf(), digest);
        Ok(digest)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

fn hash_path(path: PathBuf) -> BoxFuture<'static, io::Result<FileDigest>> {
    async move {
        if fs::metadata(&path).await?.is_dir() {
            hash_dir(&path).await
        } else {
            hash_file(&path).await
        }
    }
    .boxed()
}

pub(crate) async fn hash_file(path: &Path) -> io::Result<FileDigest> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];
    loop {
        let len = file.read(&mut buffer).await?;
        if len == 0 {
            break;
        }
        hasher.update(&buffer[..len]);
    }
    Ok(hasher.finalize().into())
}

async fn hash_dir(path: &Path) -> io::Result<FileDigest> {
    let mut names = vec![];
    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name());
    }
    names.sort();

    let mut hasher = Sha256::new();
    hasher.update(b"dir");
    for name in names {
        let digest = hash_path(path.join(&name)).await?;
        let mut entry = vec![];
        write_bytes(&mut entry, name.as_encoded_bytes());
        hasher.update(&entry);
        hasher.update(digest);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[tokio::test]
    async fn hashes_file_contents() {
        let root = assert_fs::TempDir::new().unwrap();
        let a = root.child("a.txt");
        let b = root.child("b.txt");
        a.write_str("service Foo{}").unwrap();
        b.write_str("service Foo{}").unwrap();

        let hasher = FileHasher::new();
        let digest_a = hasher.hash(a.path()).await.unwrap();
        let digest_b = hasher.hash(b.path()).await.unwrap();
        assert_eq!(digest_a, digest_b);
        let expected: FileDigest = Sha256::digest(b"service Foo{}").into();
        assert_eq!(digest_a, expected);
    }

    #[tokio::test]
    async fn remembers_digests_for_the_whole_build() {
        let root = assert_fs::TempDir::new().unwrap();
        let a = root.child("a.txt");
        a.write_str("one").unwrap();

        let hasher = FileHasher::new();
        let first = hasher.hash(a.path()).await.unwrap();
        a.write_str("two").unwrap();
        let second = hasher.hash(a.path()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(hasher.len(), 1);

        let fresh = FileHasher::new().hash(a.path()).await.unwrap();
        assert_ne!(first, fresh);
    }

    #[tokio::test]
    async fn directories_change_when_any_entry_changes() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("srcs/a.txt").write_str("a").unwrap();
        root.child("srcs/nested/b.txt").write_str("b").unwrap();

        let before = FileHasher::new()
            .hash(&root.path().join("srcs"))
            .await
            .unwrap();
        root.child("srcs/nested/b.txt").write_str("c").unwrap();
        let after = FileHasher::new()
            .hash(&root.path().join("srcs"))
            .await
            .unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn missing_files_are_errors() {
        let root = assert_fs::TempDir::new().unwrap();
        let err = FileHasher::new()
            .hash(&root.path().join("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
