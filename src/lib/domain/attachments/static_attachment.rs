//! Static attachments, shared files from the attachment library

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use super::{
    content::AttachmentReader,
    mime_types::{validate_file_name, validate_mime_type},
    AttachmentError, AttachmentSource,
};

/// The shared library of attachment files, rooted at a configured directory
#[async_trait]
pub trait StaticLibrary: Send + Sync + 'static {
    /// Every file below the library root as a relative path, sorted
    async fn list(&self) -> Result<Vec<String>, AttachmentError>;

    /// Check that `relative_path` names an existing regular file inside the library root
    async fn validate(&self, relative_path: &str) -> Result<(), AttachmentError>;

    /// Open a library file for reading
    async fn open(&self, relative_path: &str) -> Result<AttachmentReader, AttachmentError>;
}

#[cfg(test)]
mock! {
    pub StaticLibrary {}

    #[async_trait]
    impl StaticLibrary for StaticLibrary {
        async fn list(&self) -> Result<Vec<String>, AttachmentError>;
        async fn validate(&self, relative_path: &str) -> Result<(), AttachmentError>;
        async fn open(&self, relative_path: &str) -> Result<AttachmentReader, AttachmentError>;
    }
}

/// A library file attached to a campaign or a mail.
///
/// The same library file may be referenced by any number of campaigns and mails; removing a
/// reference never touches the file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticAttachment {
    /// Record ID, `0` until stored
    pub id: i64,

    /// Display name, blank to use the file's basename
    pub filename: String,

    /// MIME type, blank to guess it from the file name
    pub mime_type: String,

    /// Path of the file relative to the library root
    pub attachment: String,
}

impl StaticAttachment {
    /// A reference to the library file at `relative_path`
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            attachment: relative_path.into(),
            ..Default::default()
        }
    }

    /// Override the display name
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Override the MIME type
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Validate the record before it is stored
    pub async fn validate(&self, library: &dyn StaticLibrary) -> Result<(), AttachmentError> {
        validate_file_name(&self.filename)?;
        validate_mime_type(&self.mime_type)?;
        library.validate(&self.attachment).await
    }
}

#[async_trait]
impl AttachmentSource for StaticAttachment {
    type Storage = dyn StaticLibrary;

    fn storage_reference(&self) -> &str {
        &self.attachment
    }

    fn declared_file_name(&self) -> &str {
        &self.filename
    }

    fn declared_mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn open(&self, library: &dyn StaticLibrary) -> Result<AttachmentReader, AttachmentError> {
        library.open(&self.attachment).await
    }
}
