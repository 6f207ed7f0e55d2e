//! Managed storage for uploaded attachments

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::domain::attachments::{AttachmentError, AttachmentReader, UploadPlacement, UploadStore};

use super::contained_path;

const MAX_SAVE_ATTEMPTS: usize = 5;
const SUFFIX_LENGTH: usize = 7;

/// Uploaded attachment files stored below a media root
#[derive(Debug, Clone)]
pub struct FilesystemUploadStore {
    root: PathBuf,
    placement: UploadPlacement,
}

impl FilesystemUploadStore {
    /// Create a store writing below `root`, naming files with `placement`
    pub fn new(root: impl Into<PathBuf>, placement: UploadPlacement) -> Self {
        Self {
            root: root.into(),
            placement,
        }
    }

    /// The media root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// `name` with a random suffix inserted before its extension
fn with_random_suffix(name: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LENGTH)
        .map(char::from)
        .collect();

    let (directory, file_name) = match name.rsplit_once('/') {
        Some((directory, file_name)) => (Some(directory), file_name),
        None => (None, name),
    };

    let file_name = match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem}_{suffix}.{extension}"),
        _ => format!("{file_name}_{suffix}"),
    };

    match directory {
        Some(directory) => format!("{directory}/{file_name}"),
        None => file_name,
    }
}

/// Write `content` to the freshly created file at `path`, removing the file if the write fails
async fn write_or_release<W>(
    mut file: W,
    path: &Path,
    name: &str,
    content: &[u8],
) -> Result<(), AttachmentError>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(content).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);

    let Err(e) = written else {
        return Ok(());
    };

    if let Err(remove_err) = fs::remove_file(path).await {
        warn!(
            attachment = %name,
            error = %remove_err,
            "could not release partially written upload"
        );
    }

    Err(AttachmentError::unavailable(name, e))
}

#[async_trait]
impl UploadStore for FilesystemUploadStore {
    async fn save(
        &self,
        mail_id: i64,
        filename: &str,
        content: &[u8],
    ) -> Result<String, AttachmentError> {
        let placed = self.placement.place(mail_id, filename, Utc::now());
        let mut name = placed.clone();

        for _ in 0..MAX_SAVE_ATTEMPTS {
            let path = contained_path(&self.root, &name)?;

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AttachmentError::unavailable(&name, e))?;
            }

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    write_or_release(file, &path, &name, content).await?;

                    return Ok(name);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(attachment = %name, "upload name taken, adding a suffix");

                    name = with_random_suffix(&placed);
                }
                Err(e) => return Err(AttachmentError::unavailable(&name, e)),
            }
        }

        Err(AttachmentError::unavailable(
            placed,
            io::Error::new(io::ErrorKind::AlreadyExists, "no free name left"),
        ))
    }

    async fn open(&self, name: &str) -> Result<AttachmentReader, AttachmentError> {
        let path = contained_path(&self.root, name)?;

        let file = fs::File::open(&path)
            .await
            .map_err(|e| AttachmentError::unavailable(name, e))?;

        Ok(Box::new(file))
    }

    async fn delete(&self, name: &str) -> Result<bool, AttachmentError> {
        let path = contained_path(&self.root, name)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AttachmentError::unavailable(name, e)),
        }
    }
}
