use std::io;
use std::path::{Component, Path};
use tokio::fs;

/// Whether `path` lexically lives under `root` (or is `root` itself).
///
/// Paths with `..` components are never considered to be inside anything, since we do not touch
/// the filesystem to resolve them.
///
pub fn is_within(path: &Path, root: &Path) -> bool {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return false;
    }
    path.starts_with(root)
}

/// Whether `path` is relative and can not climb out of the directory it is joined onto.
pub fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Remove `dir` and everything in it, and create it again empty.
pub async fn clean_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => (),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (),
        Err(err) => return Err(err),
    }
    fs::create_dir_all(dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use std::path::PathBuf;

    #[test]
    fn paths_under_a_root_are_within_it() {
        let root = PathBuf::from("/out/gen/a/b__");
        assert!(is_within(&root, &root));
        assert!(is_within(&root.join("x/y.txt"), &root));
        assert!(!is_within(&PathBuf::from("/out/gen/a/b___"), &root));
        assert!(!is_within(&root.join("../c__/x"), &root));
    }

    #[test]
    fn only_plain_relative_paths_are_safe() {
        assert!(is_safe_relative(Path::new("a/b.txt")));
        assert!(!is_safe_relative(Path::new("")));
        assert!(!is_safe_relative(Path::new("/a/b.txt")));
        assert!(!is_safe_relative(Path::new("a/../../b.txt")));
    }

    #[tokio::test]
    async fn clean_dir_empties_existing_directories() {
        let root = assert_fs::TempDir::new().unwrap();
        root.child("out/stale.txt").write_str("stale").unwrap();

        clean_dir(&root.path().join("out")).await.unwrap();

        let out = root.path().join("out");
        assert!(out.is_dir());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn clean_dir_creates_missing_directories() {
        let root = assert_fs::TempDir::new().unwrap();
        let dir = root.path().join("a/b/c");
        clean_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
    }
}
