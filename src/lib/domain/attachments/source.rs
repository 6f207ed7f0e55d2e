//! Attachment source capability

use async_trait::async_trait;

use super::{
    content::{read_content, AttachmentContent, AttachmentReader, OpenableFile},
    mime_types::{resolve_file_name, resolve_mime_type},
    AttachmentError,
};

/// An attachment record that can resolve its name, MIME type and content.
///
/// Variants only provide their declared fields and how to open their file from their own
/// storage; name resolution, MIME guessing and the text-or-binary read are shared.
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// The storage this variant's files are opened from
    type Storage: ?Sized + Send + Sync;

    /// Path or storage name of the underlying file
    fn storage_reference(&self) -> &str;

    /// The display name entered by the operator, possibly blank
    fn declared_file_name(&self) -> &str;

    /// The MIME type entered by the operator, possibly blank
    fn declared_mime_type(&self) -> &str;

    /// Open the underlying file for one read
    async fn open(&self, storage: &Self::Storage) -> Result<AttachmentReader, AttachmentError>;

    /// The name the file is attached under
    fn file_name(&self) -> String {
        resolve_file_name(self.declared_file_name(), self.storage_reference())
    }

    /// The MIME type the file is attached with, never empty
    fn mime_type(&self) -> String {
        resolve_mime_type(self.declared_mime_type(), &self.file_name())
    }

    /// Read the content to attach
    async fn file_content(
        &self,
        storage: &Self::Storage,
    ) -> Result<AttachmentContent, AttachmentError> {
        let mime_type = self.mime_type();

        read_content(
            &StoredFile {
                attachment: self,
                storage,
            },
            &mime_type,
        )
        .await
    }
}

/// An attachment paired with the storage it lives in
struct StoredFile<'a, A>
where
    A: AttachmentSource + ?Sized,
{
    attachment: &'a A,
    storage: &'a A::Storage,
}

#[async_trait]
impl<'a, A> OpenableFile for StoredFile<'a, A>
where
    A: AttachmentSource + ?Sized,
{
    fn reference(&self) -> &str {
        self.attachment.storage_reference()
    }

    async fn open(&self) -> Result<AttachmentReader, AttachmentError> {
        self.attachment.open(self.storage).await
    }
}
