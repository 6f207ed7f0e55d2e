//! Campaigns and mails.
//!
//! A [`Mail`] is rendered from a [`Campaign`] by an external template engine. This module keeps
//! the records around it (custom headers, static and dynamic attachments, delivery state and
//! the blacklist) and assembles everything into an outgoing message with [`MailAssembler`].

mod assembly;
mod headers;
mod models;
mod repository;
mod service;

pub mod errors;

pub use assembly::{
    AssembledMail, AttachmentOrigin, FailedAttachment, MailAssembler, ResolvedAttachment,
};
pub use headers::{merge_headers, MailHeader, MAX_HEADER_NAME_LENGTH, MAX_HEADER_VALUE_LENGTH};
pub use models::{AttachmentOwner, BlacklistEntry, Campaign, Mail, MailStatus};
pub use repository::MailRepository;
pub use service::{MailService, MailServiceImpl};
