//! Attachment content resolution
//!
//! The declared MIME type decides how an attachment is read: `text/*` files are decoded as
//! UTF-8, everything else is read as raw bytes. A file declared as text that turns out not to
//! be valid UTF-8 is read a second time in binary mode instead of failing, so a wrong MIME type
//! costs one extra read but never loses the attachment.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::AttachmentError;

/// A reader over one opened attachment file
pub type AttachmentReader = Box<dyn AsyncRead + Send + Unpin>;

/// The content of an attachment, ready to be attached to a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentContent {
    /// Content decoded as UTF-8 text
    Text(String),

    /// Raw bytes
    Binary(Vec<u8>),
}

impl AttachmentContent {
    /// The content as bytes, whatever the read mode was
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Consume the content into its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Whether the content was read in text mode
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// Length of the content in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the content is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something that can be opened for reading, once per read attempt
#[async_trait]
pub trait OpenableFile: Send + Sync {
    /// Path or storage name identifying the file in errors and logs
    fn reference(&self) -> &str;

    /// Open a fresh reader positioned at the start of the file
    async fn open(&self) -> Result<AttachmentReader, AttachmentError>;
}

/// The part of a MIME type before the `/`
pub fn base_type(mime_type: &str) -> &str {
    mime_type
        .split_once('/')
        .map_or(mime_type, |(base, _)| base)
        .trim()
}

/// Read the content of `file`, choosing text or binary mode from `mime_type`.
///
/// # Errors
/// - [`AttachmentError::ResourceUnavailable`] if the file cannot be opened.
/// - [`AttachmentError::UnreadableAttachment`] if an opened file cannot be read.
pub async fn read_content<F>(file: &F, mime_type: &str) -> Result<AttachmentContent, AttachmentError>
where
    F: OpenableFile + ?Sized,
{
    if base_type(mime_type).eq_ignore_ascii_case("text") {
        if let Some(text) = read_text(file).await? {
            return Ok(AttachmentContent::Text(text));
        }

        debug!(
            reference = file.reference(),
            mime_type, "attachment is not valid UTF-8, reading it again as binary"
        );
    }

    read_binary(file).await.map(AttachmentContent::Binary)
}

/// Returns `None` when the content is not valid UTF-8.
async fn read_text<F>(file: &F) -> Result<Option<String>, AttachmentError>
where
    F: OpenableFile + ?Sized,
{
    let mut reader = file.open().await?;
    let mut text = String::new();

    match reader.read_to_string(&mut text).await {
        Ok(_) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::InvalidData => Ok(None),
        Err(err) => Err(AttachmentError::unreadable(file.reference(), err)),
    }
}

async fn read_binary<F>(file: &F) -> Result<Vec<u8>, AttachmentError>
where
    F: OpenableFile + ?Sized,
{
    let mut reader = file.open().await?;
    let mut bytes = Vec::new();

    reader
        .read_to_end(&mut bytes)
        .await
        .map_err(|err| AttachmentError::unreadable(file.reference(), err))?;

    Ok(bytes)
}
