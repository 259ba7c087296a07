use crate::error::ServiceError;
use crate::restore::source::{RestoreSource, SourceFailure};
use async_trait::async_trait;
use backup_bus::fs::relative_key_to_path;
use backup_bus::protocol::restore::SourceMedium;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// How [`LocalTier::place`] satisfied a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The file was created by this write
    Created,
    /// An identical copy was already there
    Existing,
}

/// A local directory holding one full copy of every backup.
///
/// Files live at `<root>/<structure>/<relative_path>`.
#[derive(Debug, Clone)]
pub struct LocalTier {
    medium: SourceMedium,
    root: PathBuf,
}

impl LocalTier {
    pub fn new(medium: SourceMedium, root: impl Into<PathBuf>) -> Self {
        Self {
            medium,
            root: root.into(),
        }
    }

    pub fn primary(root: impl Into<PathBuf>) -> Self {
        Self::new(SourceMedium::LocalPrimary, root)
    }

    pub fn secondary(root: impl Into<PathBuf>) -> Self {
        Self::new(SourceMedium::LocalSecondary, root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, structure: &str, relative_path: &str) -> Result<PathBuf, ServiceError> {
        let structure = relative_key_to_path(structure)
            .map_err(|e| ServiceError::Protocol(format!("invalid path: structure {}", e)))?;
        let relative = relative_key_to_path(relative_path)
            .map_err(|e| ServiceError::Protocol(format!("invalid path: {}", e)))?;
        Ok(self.root.join(structure).join(relative))
    }

    /// Write `content` at `path` without ever replacing an existing file.
    ///
    /// An existing file with identical bytes is left alone and reported as
    /// [`Placement::Existing`]. Different bytes fail with `AlreadyExists`. A
    /// file created here but not fully written is removed again.
    pub async fn place(&self, path: &Path, content: &[u8]) -> std::io::Result<Placement> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return if tokio::fs::read(path).await? == content {
                    Ok(Placement::Existing)
                } else {
                    Err(std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!("{} already holds different content", path.display()),
                    ))
                };
            }
            Err(e) => return Err(e),
        };

        let written = async {
            file.write_all(content).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = Self::remove(path).await {
                warn!("Could not remove partial file {}: {}", path.display(), cleanup);
            }
            return Err(e);
        }
        Ok(Placement::Created)
    }

    /// Delete one artifact; an already missing file counts as removed.
    pub async fn remove(path: &Path) -> std::io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RestoreSource for LocalTier {
    fn medium(&self) -> SourceMedium {
        self.medium
    }

    async fn read(&self, structure: &str, relative_path: &str) -> Result<Vec<u8>, SourceFailure> {
        let path = self
            .path_for(structure, relative_path)
            .map_err(|e| SourceFailure::ReadError(e.to_string()))?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SourceFailure::NotFound(format!("{} is missing", path.display())))
            }
            Err(e) => Err(SourceFailure::ReadError(format!("{}: {}", path.display(), e))),
        }
    }
}
