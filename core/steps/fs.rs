use super::{StepContext, StepError};
use crate::util::fs::clean_dir;
use futures::future::{BoxFuture, FutureExt};
use std::path::PathBuf;
use tokio::fs;

/// Removes a directory if it exists, and creates it again empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeCleanDirStep {
    path: PathBuf,
}

impl MakeCleanDirStep {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn description(&self) -> String {
        format!("rm -rf {0} && mkdir -p {0}", self.path.display())
    }

    pub async fn run(&self, ctx: &StepContext) -> Result<(), StepError> {
        ctx.check_writable(&self.path)?;
        clean_dir(&self.path).await.map_err(StepError::io(&self.path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkdirStep {
    path: PathBuf,
}

impl MkdirStep {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn description(&self) -> String {
        format!("mkdir -p {}", self.path.display())
    }

    pub async fn run(&self, ctx: &StepContext) -> Result<(), StepError> {
        ctx.check_writable(&self.path)?;
        fs::create_dir_all(&self.path)
            .await
            .map_err(StepError::io(&self.path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFileStep {
    path: PathBuf,
    contents: Vec<u8>,
}

impl WriteFileStep {
    pub fn new<P: Into<PathBuf>, C: Into<Vec<u8>>>(path: P, contents: C) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn description(&self) -> String {
        format!(
            "write {} bytes to {}",
            self.contents.len(),
            self.path.display()
        )
    }

    pub async fn run(&self, ctx: &StepContext) -> Result<(), StepError> {
        ctx.check_writable(&self.path)?;
        fs::write(&self.path, &self.contents)
            .await
            .map_err(StepError::io(&self.path))
    }
}

/// Copies a file or a directory tree. The source may live anywhere, the destination must be in
/// the rule's output area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStep {
    src: PathBuf,
    dst: PathBuf,
}

impl CopyStep {
    pub fn new<S: Into<PathBuf>, D: Into<PathBuf>>(src: S, dst: D) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn description(&self) -> String {
        format!("cp -r {} {}", self.src.display(), self.dst.display())
    }

    pub async fn run(&self, ctx: &StepContext) -> Result<(), StepError> {
        ctx.check_writable(&self.dst)?;
        if let Some(parent) = self.dst.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(StepError::io(parent))?;
        }
        copy_recursively(self.src.clone(), self.dst.clone()).await
    }
}

fn copy_recursively(src: PathBuf, dst: PathBuf) -> BoxFuture<'static, Result<(), StepError>> {
    async move {
        let metadata = fs::metadata(&src).await.map_err(StepError::io(&src))?;
        if !metadata.is_dir() {
            fs::copy(&src, &dst).await.map_err(StepError::io(&src))?;
            return Ok(());
        }

        fs::create_dir_all(&dst).await.map_err(StepError::io(&dst))?;
        let mut entries = fs::read_dir(&src).await.map_err(StepError::io(&src))?;
        while let Some(entry) = entries.next_entry().await.map_err(StepError::io(&src))? {
            let name = entry.file_name();
            copy_recursively(src.join(&name), dst.join(&name)).await?;
        }
        Ok(())
    }
    .boxed()
}
