//! Dynamic attachments, files uploaded for a single mail

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use super::{
    content::AttachmentReader,
    mime_types::{validate_file_name, validate_mime_type},
    AttachmentError, AttachmentSource,
};

/// Managed storage for uploaded attachment files
#[async_trait]
pub trait UploadStore: Send + Sync + 'static {
    /// Store `content` for `mail_id` and return the storage name it was saved under
    async fn save(
        &self,
        mail_id: i64,
        filename: &str,
        content: &[u8],
    ) -> Result<String, AttachmentError>;

    /// Open a stored file for reading
    async fn open(&self, name: &str) -> Result<AttachmentReader, AttachmentError>;

    /// Remove a stored file. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, AttachmentError>;
}

#[cfg(test)]
mock! {
    pub UploadStore {}

    #[async_trait]
    impl UploadStore for UploadStore {
        async fn save(&self, mail_id: i64, filename: &str, content: &[u8]) -> Result<String, AttachmentError>;
        async fn open(&self, name: &str) -> Result<AttachmentReader, AttachmentError>;
        async fn delete(&self, name: &str) -> Result<bool, AttachmentError>;
    }
}

/// A file uploaded for exactly one mail. It is released when the mail is deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicAttachment {
    /// Record ID
    pub id: i64,

    /// The mail owning the file
    pub mail_id: i64,

    /// Display name, blank to use the stored file's basename
    pub filename: String,

    /// MIME type, blank to guess it from the file name
    pub mime_type: String,

    /// Storage name of the uploaded file
    pub attachment: String,
}

/// An uploaded file about to be recorded against a mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDynamicAttachment {
    mail_id: i64,
    filename: String,
    mime_type: String,
    attachment: String,
}

impl NewDynamicAttachment {
    /// Create a record for a file already saved under `attachment`
    pub fn new(
        mail_id: i64,
        filename: &str,
        mime_type: &str,
        attachment: impl Into<String>,
    ) -> Result<Self, AttachmentError> {
        validate_file_name(filename)?;
        validate_mime_type(mime_type)?;

        Ok(Self {
            mail_id,
            filename: filename.trim().to_string(),
            mime_type: mime_type.trim().to_string(),
            attachment: attachment.into(),
        })
    }

    /// The owning mail
    pub fn mail_id(&self) -> i64 {
        self.mail_id
    }

    /// The display name
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The MIME type override
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The storage name
    pub fn attachment(&self) -> &str {
        &self.attachment
    }

    /// The stored record once it has been assigned `id`
    pub fn into_attachment(self, id: i64) -> DynamicAttachment {
        DynamicAttachment {
            id,
            mail_id: self.mail_id,
            filename: self.filename,
            mime_type: self.mime_type,
            attachment: self.attachment,
        }
    }
}

#[async_trait]
impl AttachmentSource for DynamicAttachment {
    type Storage = dyn UploadStore;

    fn storage_reference(&self) -> &str {
        &self.attachment
    }

    fn declared_file_name(&self) -> &str {
        &self.filename
    }

    fn declared_mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn open(&self, uploads: &dyn UploadStore) -> Result<AttachmentReader, AttachmentError> {
        uploads.open(&self.attachment).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use mockall::predicate::eq;
    use testresult::TestResult;

    use crate::domain::attachments::AttachmentContent;

    use super::*;

    #[test]
    fn test_new_dynamic_attachment_rejects_invalid_mime_type() {
        let result = NewDynamicAttachment::new(1, "a.bin", "binary", "mailing/a.bin");

        assert!(matches!(result, Err(AttachmentError::InvalidMimeType(_))));
    }

    #[test]
    fn test_new_dynamic_attachment_into_attachment() -> TestResult {
        let attachment = NewDynamicAttachment::new(
            7,
            " invoice.pdf ",
            "",
            "mailing/attachments/2016/02/09/invoice.pdf",
        )?
        .into_attachment(3);

        assert_eq!(attachment.id, 3);
        assert_eq!(attachment.mail_id, 7);
        assert_eq!(attachment.filename, "invoice.pdf");
        assert_eq!(attachment.mime_type(), "application/pdf");

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_text_is_read_twice_from_store() -> TestResult {
        let bytes = vec![0xca, 0xfe, 0xba, 0xbe];
        let expected = bytes.clone();

        let mut uploads = MockUploadStore::new();

        uploads
            .expect_open()
            .with(eq("mailing/attachments/2016/02/09/data.txt"))
            .times(2)
            .returning(move |_| Ok(Box::new(Cursor::new(bytes.clone()))));

        let attachment = DynamicAttachment {
            id: 1,
            mail_id: 1,
            filename: String::new(),
            mime_type: String::new(),
            attachment: "mailing/attachments/2016/02/09/data.txt".to_string(),
        };

        let content = attachment.file_content(&uploads).await?;

        assert_eq!(attachment.file_name(), "data.txt");
        assert_eq!(content, AttachmentContent::Binary(expected));

        Ok(())
    }
}
