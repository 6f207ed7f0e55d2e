//! Error types for campaigns, mails and their assembly

use anyhow::anyhow;
use thiserror::Error;
use tracing::debug;

use crate::domain::attachments::AttachmentError;

/// Errors that can occur when validating a custom header
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// The name is not a slug token
    #[error("invalid header name \"{0}\"")]
    InvalidName(String),

    /// The name is too long
    #[error("header name must be at most {0} characters long")]
    NameTooLong(usize),

    /// The value is too long
    #[error("header value must be at most {0} characters long")]
    ValueTooLong(usize),

    /// The value contains a line break
    #[error("value of header \"{0}\" must not contain line breaks")]
    InvalidValue(String),
}

/// Errors that can occur when reading or writing mailing records
#[derive(Debug, Error)]
pub enum MailStoreError {
    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when getting a mail
#[derive(Debug, Error)]
pub enum GetMailError {
    /// Mail not found
    #[error("mail with id \"{0}\" not found")]
    MailNotFound(i64),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when getting a campaign
#[derive(Debug, Error)]
pub enum GetCampaignError {
    /// Campaign not found
    #[error("campaign with id \"{0}\" not found")]
    CampaignNotFound(i64),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when updating a mail
#[derive(Debug, Error)]
pub enum UpdateMailError {
    /// Mail not found
    #[error("mail with id \"{0}\" not found")]
    MailNotFound(i64),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when deleting a mail
#[derive(Debug, Error)]
pub enum DeleteMailError {
    /// Mail not found
    #[error("mail with id \"{0}\" not found")]
    MailNotFound(i64),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when attaching a file or a header to a campaign or a mail
#[derive(Debug, Error)]
pub enum AddAttachmentError {
    /// The attachment is invalid or its file could not be stored
    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    /// The header is invalid
    #[error(transparent)]
    Header(#[from] HeaderError),

    /// Mail not found
    #[error("mail with id \"{0}\" not found")]
    MailNotFound(i64),

    /// Campaign not found
    #[error("campaign with id \"{0}\" not found")]
    CampaignNotFound(i64),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when assembling a mail
#[derive(Debug, Error)]
pub enum AssembleError {
    /// Mail not found
    #[error("mail with id \"{0}\" not found")]
    MailNotFound(i64),

    /// The mail refers to a campaign that does not exist
    #[error("campaign with id \"{0}\" not found")]
    CampaignNotFound(i64),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when turning an assembled mail into a message
#[derive(Debug, Error)]
pub enum BuildMessageError {
    /// A custom header was rejected by the message builder
    #[error("invalid header name \"{0}\"")]
    InvalidHeader(String),

    /// An attachment's MIME type was rejected by the message builder
    #[error("invalid content type \"{0}\"")]
    InvalidContentType(String),

    /// The message could not be built
    #[error(transparent)]
    Message(#[from] lettre::error::Error),
}

impl From<MailStoreError> for GetMailError {
    fn from(err: MailStoreError) -> Self {
        debug!("MailStoreError -> GetMailError");

        match err {
            MailStoreError::UnknownError(e) => GetMailError::UnknownError(e),
        }
    }
}

impl From<MailStoreError> for AssembleError {
    fn from(err: MailStoreError) -> Self {
        debug!("MailStoreError -> AssembleError");

        match err {
            MailStoreError::UnknownError(e) => AssembleError::UnknownError(e),
        }
    }
}

impl From<MailStoreError> for AddAttachmentError {
    fn from(err: MailStoreError) -> Self {
        debug!("MailStoreError -> AddAttachmentError");

        match err {
            MailStoreError::UnknownError(e) => AddAttachmentError::UnknownError(e),
        }
    }
}

impl From<GetMailError> for AssembleError {
    fn from(err: GetMailError) -> Self {
        debug!("GetMailError -> AssembleError");

        match err {
            GetMailError::MailNotFound(id) => AssembleError::MailNotFound(id),
            GetMailError::UnknownError(e) => AssembleError::UnknownError(e),
        }
    }
}

impl From<GetCampaignError> for AssembleError {
    fn from(err: GetCampaignError) -> Self {
        debug!("GetCampaignError -> AssembleError");

        match err {
            GetCampaignError::CampaignNotFound(id) => AssembleError::CampaignNotFound(id),
            GetCampaignError::UnknownError(e) => AssembleError::UnknownError(e),
        }
    }
}

impl From<GetMailError> for AddAttachmentError {
    fn from(err: GetMailError) -> Self {
        debug!("GetMailError -> AddAttachmentError");

        match err {
            GetMailError::MailNotFound(id) => AddAttachmentError::MailNotFound(id),
            GetMailError::UnknownError(e) => AddAttachmentError::UnknownError(e),
        }
    }
}

impl From<GetCampaignError> for AddAttachmentError {
    fn from(err: GetCampaignError) -> Self {
        debug!("GetCampaignError -> AddAttachmentError");

        match err {
            GetCampaignError::CampaignNotFound(id) => AddAttachmentError::CampaignNotFound(id),
            GetCampaignError::UnknownError(e) => AddAttachmentError::UnknownError(e),
        }
    }
}

impl From<sqlx::Error> for MailStoreError {
    fn from(err: sqlx::Error) -> Self {
        MailStoreError::UnknownError(anyhow!("Unknown database error: {:?}", err))
    }
}
