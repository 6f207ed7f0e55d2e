//! Configuration read from command-line arguments and environment variables

use std::path::PathBuf;

use clap::Parser;

use crate::domain::attachments::{AttachmentError, UploadPlacement, DEFAULT_UPLOAD_TEMPLATE};

use super::storage::{FilesystemStaticLibrary, FilesystemUploadStore};

/// Where attachment files live
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
pub struct AttachmentsConfig {
    /// Root of the static attachment library
    #[arg(long, env = "MAILING_ATTACHMENTS_DIR", default_value = "attachments")]
    pub attachments_dir: PathBuf,

    /// Media root uploaded attachments are stored below
    #[arg(long, env = "MAILING_MEDIA_ROOT", default_value = "media")]
    pub media_root: PathBuf,

    /// Directory template for uploads, formatted with the upload date
    #[arg(long, env = "MAILING_ATTACHMENTS_UPLOAD_DIR", default_value = DEFAULT_UPLOAD_TEMPLATE)]
    pub upload_dir: String,
}

impl AttachmentsConfig {
    /// The static attachment library
    pub fn static_library(&self) -> FilesystemStaticLibrary {
        FilesystemStaticLibrary::new(&self.attachments_dir)
    }

    /// The upload store. Fails if the upload directory template is invalid.
    pub fn upload_store(&self) -> Result<FilesystemUploadStore, AttachmentError> {
        Ok(FilesystemUploadStore::new(
            &self.media_root,
            UploadPlacement::date_template(&self.upload_dir)?,
        ))
    }
}

/// Mail composition settings
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
pub struct MailingConfig {
    /// Prefix prepended to the subject of campaigns that ask for it
    #[arg(long, env = "MAILING_SUBJECT_PREFIX")]
    pub subject_prefix: Option<String>,

    /// Sender of assembled messages
    #[arg(long, env = "MAILING_DEFAULT_FROM", default_value = "noreply@localhost")]
    pub default_from: String,
}
