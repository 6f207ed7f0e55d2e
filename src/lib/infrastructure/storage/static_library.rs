//! Static attachment library backed by a directory tree

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;

use crate::domain::attachments::{AttachmentError, AttachmentReader, StaticLibrary};

use super::contained_path;

/// The shared attachment library, a directory whose files are referenced by relative path
#[derive(Debug, Clone)]
pub struct FilesystemStaticLibrary {
    root: PathBuf,
}

impl FilesystemStaticLibrary {
    /// Create a library rooted at `root`. The directory does not need to exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The library root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` is a symlink to a regular file inside the library. Linked directories
    /// are not descended into.
    async fn is_contained_file_link(&self, path: &Path) -> bool {
        let Ok(root) = fs::canonicalize(&self.root).await else {
            return false;
        };
        let Ok(target) = fs::canonicalize(path).await else {
            return false;
        };

        if !target.starts_with(&root) {
            return false;
        }

        matches!(fs::metadata(&target).await, Ok(metadata) if metadata.is_file())
    }
}

#[async_trait]
impl StaticLibrary for FilesystemStaticLibrary {
    async fn list(&self) -> Result<Vec<String>, AttachmentError> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(directory) = pending.pop() {
            let mut entries = match fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound && directory == self.root => {
                    return Ok(files);
                }
                Err(e) => {
                    return Err(AttachmentError::unavailable(
                        directory.to_string_lossy(),
                        e,
                    ))
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| AttachmentError::unavailable(directory.to_string_lossy(), e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| AttachmentError::unavailable(path.to_string_lossy(), e))?;

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() || self.is_contained_file_link(&path).await {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        let relative: Vec<_> = relative
                            .components()
                            .map(|component| component.as_os_str().to_string_lossy())
                            .collect();

                        files.push(relative.join("/"));
                    }
                }
            }
        }

        files.sort();

        Ok(files)
    }

    async fn validate(&self, relative_path: &str) -> Result<(), AttachmentError> {
        let path = contained_path(&self.root, relative_path)?;
        let invalid = |_: io::Error| AttachmentError::InvalidPath(relative_path.to_string());

        let root = fs::canonicalize(&self.root).await.map_err(invalid)?;
        let path = fs::canonicalize(&path).await.map_err(invalid)?;

        // Symlinks may still point outside the root.
        if !path.starts_with(&root) {
            return Err(AttachmentError::InvalidPath(relative_path.to_string()));
        }

        if !fs::metadata(&path).await.map_err(invalid)?.is_file() {
            return Err(AttachmentError::InvalidPath(relative_path.to_string()));
        }

        Ok(())
    }

    async fn open(&self, relative_path: &str) -> Result<AttachmentReader, AttachmentError> {
        let path = contained_path(&self.root, relative_path)?;

        let file = fs::File::open(&path)
            .await
            .map_err(|e| AttachmentError::unavailable(relative_path, e))?;

        Ok(Box::new(file))
    }
}
