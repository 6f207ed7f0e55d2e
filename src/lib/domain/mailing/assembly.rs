//! Mail assembly: the composition point gathering a mail's subject, headers and attachments

use std::{fmt, sync::Arc};

use lettre::{
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Attachment, Mailbox, MultiPart,
    },
    Message,
};
use tracing::{debug, warn};

use crate::domain::{
    attachments::{
        AttachmentContent, AttachmentError, AttachmentSource, StaticLibrary, UploadStore,
    },
    mailing::{
        errors::{AssembleError, BuildMessageError},
        merge_headers, AttachmentOwner, Campaign, Mail, MailHeader, MailRepository,
    },
};

/// Where an attachment was resolved from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentOrigin {
    /// A static attachment shared by the mail's campaign
    Campaign,

    /// A static attachment of the mail itself
    MailStatic,

    /// A file uploaded for the mail
    MailDynamic,
}

/// An attachment ready to be added to the message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAttachment {
    /// Where the attachment came from
    pub origin: AttachmentOrigin,

    /// Name the file is attached under
    pub file_name: String,

    /// MIME type of the file
    pub mime_type: String,

    /// File content
    pub content: AttachmentContent,
}

/// An attachment that was left out of the message because its content could not be read
#[derive(Debug)]
pub struct FailedAttachment {
    /// Where the attachment came from
    pub origin: AttachmentOrigin,

    /// Path or storage name of the file
    pub reference: String,

    /// Why it could not be read
    pub error: AttachmentError,
}

/// Everything needed to build the outgoing message for one mail
#[derive(Debug)]
pub struct AssembledMail {
    /// The assembled mail
    pub mail_id: i64,

    /// Subject, prefixed when the campaign asks for it
    pub subject: String,

    /// Rendered HTML body
    pub html_body: String,

    /// Rendered plain text body
    pub text_body: String,

    /// Campaign headers merged with mail headers
    pub headers: Vec<MailHeader>,

    /// Campaign static, mail static, then mail dynamic attachments
    pub attachments: Vec<ResolvedAttachment>,

    /// Attachments excluded from the message
    pub failed_attachments: Vec<FailedAttachment>,
}

impl AssembledMail {
    /// Whether every attachment could be resolved
    pub fn is_complete(&self) -> bool {
        self.failed_attachments.is_empty()
    }

    /// Build the MIME message: the text and HTML alternatives, followed by the attachments
    pub fn to_message(&self, from: Mailbox, to: Mailbox) -> Result<Message, BuildMessageError> {
        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone());

        for header in &self.headers {
            let name = HeaderName::new_from_ascii(header.name().to_string())
                .map_err(|_| BuildMessageError::InvalidHeader(header.name().to_string()))?;

            builder = builder.raw_header(HeaderValue::new(name, header.value().to_string()));
        }

        let body = MultiPart::alternative_plain_html(self.text_body.clone(), self.html_body.clone());

        if self.attachments.is_empty() {
            return Ok(builder.multipart(body)?);
        }

        let mut mixed = MultiPart::mixed().multipart(body);

        for attachment in &self.attachments {
            let content_type = ContentType::parse(&attachment.mime_type)
                .map_err(|_| BuildMessageError::InvalidContentType(attachment.mime_type.clone()))?;

            mixed = mixed.singlepart(
                Attachment::new(attachment.file_name.clone())
                    .body(attachment.content.as_bytes().to_vec(), content_type),
            );
        }

        Ok(builder.multipart(mixed)?)
    }
}

/// Assembles mails from their records and attachment storage
#[derive(Clone)]
pub struct MailAssembler<R>
where
    R: MailRepository,
{
    repo: Arc<R>,
    library: Arc<dyn StaticLibrary>,
    uploads: Arc<dyn UploadStore>,
    subject_prefix: Option<String>,
}

impl<R> fmt::Debug for MailAssembler<R>
where
    R: MailRepository + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailAssembler")
            .field("repo", &self.repo)
            .field("subject_prefix", &self.subject_prefix)
            .finish_non_exhaustive()
    }
}

impl<R> MailAssembler<R>
where
    R: MailRepository,
{
    /// Create a new assembler
    pub fn new(
        repo: Arc<R>,
        library: Arc<dyn StaticLibrary>,
        uploads: Arc<dyn UploadStore>,
        subject_prefix: Option<String>,
    ) -> Self {
        Self {
            repo,
            library,
            uploads,
            subject_prefix: subject_prefix
                .map(|prefix| prefix.trim().to_string())
                .filter(|prefix| !prefix.is_empty()),
        }
    }

    /// The subject the mail is sent with
    pub fn subject(&self, mail: &Mail, campaign: Option<&Campaign>) -> String {
        match (campaign, &self.subject_prefix) {
            (Some(campaign), Some(prefix)) if campaign.prefix_subject => {
                format!("{prefix} {}", mail.subject)
            }
            _ => mail.subject.clone(),
        }
    }

    /// Gather everything needed to send `mail_id`.
    ///
    /// Attachments whose content cannot be read are reported in
    /// [`AssembledMail::failed_attachments`] instead of failing the whole mail.
    pub async fn assemble(&self, mail_id: i64) -> Result<AssembledMail, AssembleError> {
        let mail = self.repo.get_mail(mail_id).await?;

        let campaign = match mail.campaign_id {
            Some(campaign_id) => Some(self.repo.get_campaign(campaign_id).await?),
            None => None,
        };

        let campaign_headers = match &campaign {
            Some(campaign) => {
                self.repo
                    .headers(AttachmentOwner::Campaign(campaign.id))
                    .await?
            }
            None => Vec::new(),
        };
        let mail_headers = self.repo.headers(AttachmentOwner::Mail(mail.id)).await?;

        let mut assembled = AssembledMail {
            mail_id: mail.id,
            subject: self.subject(&mail, campaign.as_ref()),
            html_body: mail.html_body.clone(),
            text_body: mail.text_body.clone(),
            headers: merge_headers(campaign_headers, mail_headers),
            attachments: Vec::new(),
            failed_attachments: Vec::new(),
        };

        if let Some(campaign) = &campaign {
            for attachment in self
                .repo
                .static_attachments(AttachmentOwner::Campaign(campaign.id))
                .await?
            {
                assembled
                    .resolve(AttachmentOrigin::Campaign, &attachment, self.library.as_ref())
                    .await;
            }
        }

        for attachment in self
            .repo
            .static_attachments(AttachmentOwner::Mail(mail.id))
            .await?
        {
            assembled
                .resolve(AttachmentOrigin::MailStatic, &attachment, self.library.as_ref())
                .await;
        }

        for attachment in self.repo.dynamic_attachments(mail.id).await? {
            assembled
                .resolve(AttachmentOrigin::MailDynamic, &attachment, self.uploads.as_ref())
                .await;
        }

        debug!(
            mail_id,
            attachments = assembled.attachments.len(),
            failed = assembled.failed_attachments.len(),
            "mail assembled"
        );

        Ok(assembled)
    }
}

impl AssembledMail {
    async fn resolve<A>(&mut self, origin: AttachmentOrigin, attachment: &A, storage: &A::Storage)
    where
        A: AttachmentSource,
    {
        match attachment.file_content(storage).await {
            Ok(content) => self.attachments.push(ResolvedAttachment {
                origin,
                file_name: attachment.file_name(),
                mime_type: attachment.mime_type(),
                content,
            }),
            Err(error) => {
                warn!(
                    mail_id = self.mail_id,
                    attachment = attachment.storage_reference(),
                    ?origin,
                    %error,
                    "attachment excluded from mail"
                );

                self.failed_attachments.push(FailedAttachment {
                    origin,
                    reference: attachment.storage_reference().to_string(),
                    error,
                });
            }
        }
    }
}
