//! Attachment errors

use std::io;

use thiserror::Error;

/// Errors that can occur when validating, storing or reading an attachment
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// The storage backend could not open or locate the file
    #[error("attachment \"{reference}\" is unavailable: {source}")]
    ResourceUnavailable {
        /// Path or storage name of the attachment
        reference: String,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The file was opened but its content could not be read
    #[error("attachment \"{reference}\" could not be read: {source}")]
    UnreadableAttachment {
        /// Path or storage name of the attachment
        reference: String,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The declared MIME type is malformed
    #[error("invalid mime type \"{0}\"")]
    InvalidMimeType(String),

    /// The path does not name a file inside the attachment library
    #[error("invalid attachment path \"{0}\"")]
    InvalidPath(String),

    /// A field exceeds its maximum length
    #[error("{field} must be at most {max} characters long")]
    FieldTooLong {
        /// Name of the offending field
        field: &'static str,

        /// Maximum length in characters
        max: usize,
    },

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl AttachmentError {
    /// Build a [`AttachmentError::ResourceUnavailable`] for `reference`
    pub fn unavailable(reference: impl Into<String>, source: io::Error) -> Self {
        Self::ResourceUnavailable {
            reference: reference.into(),
            source,
        }
    }

    /// Build a [`AttachmentError::UnreadableAttachment`] for `reference`
    pub fn unreadable(reference: impl Into<String>, source: io::Error) -> Self {
        Self::UnreadableAttachment {
            reference: reference.into(),
            source,
        }
    }
}
