//! Mailing service module

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    attachments::{
        validate_file_name, validate_mime_type, DynamicAttachment, NewDynamicAttachment,
        StaticAttachment, StaticLibrary, UploadStore,
    },
    communication::email_addresses::EmailAddress,
    mailing::{
        errors::{
            AddAttachmentError, DeleteMailError, GetCampaignError, MailStoreError,
            UpdateMailError,
        },
        AttachmentOwner, BlacklistEntry, MailHeader, MailRepository, MailStatus,
    },
};

/// Mailing service
#[async_trait]
pub trait MailService: Clone + Send + Sync + 'static {
    /// Store an uploaded file and record it as a dynamic attachment of `mail_id`
    async fn attach_upload(
        &self,
        mail_id: i64,
        filename: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<DynamicAttachment, AddAttachmentError>;

    /// Attach a library file to a campaign or a mail
    async fn add_static_attachment(
        &self,
        owner: AttachmentOwner,
        attachment: StaticAttachment,
    ) -> Result<StaticAttachment, AddAttachmentError>;

    /// Add a custom header to a campaign or a mail
    async fn add_header(
        &self,
        owner: AttachmentOwner,
        name: &str,
        value: &str,
    ) -> Result<MailHeader, AddAttachmentError>;

    /// Delete a mail and release the files of its dynamic attachments.
    ///
    /// # Returns
    /// How many attachment files were released.
    async fn delete_mail(&self, mail_id: i64) -> Result<usize, DeleteMailError>;

    /// Enable or disable campaigns, returning how many were changed
    async fn set_campaigns_enabled(
        &self,
        campaign_ids: &[i64],
        enabled: bool,
    ) -> Result<u64, MailStoreError>;

    /// Record that a mail was handed over for delivery
    async fn mark_sent(&self, mail_id: i64) -> Result<(), UpdateMailError>;

    /// Record that delivering a mail failed
    async fn mark_failed(&self, mail_id: i64, reason: &str) -> Result<(), UpdateMailError>;

    /// Whether `email` must not receive mail
    async fn is_blacklisted(&self, email: &EmailAddress) -> Result<bool, MailStoreError>;

    /// Block `email` from receiving mail
    async fn blacklist(&self, email: &EmailAddress, reason: &str) -> Result<(), MailStoreError>;

    /// The template a campaign's mails are rendered from
    async fn template_name(&self, campaign_id: i64) -> Result<String, GetCampaignError>;
}

#[cfg(test)]
mock! {
    pub MailService {}

    impl Clone for MailService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl MailService for MailService {
        async fn attach_upload(&self, mail_id: i64, filename: &str, mime_type: &str, content: &[u8]) -> Result<DynamicAttachment, AddAttachmentError>;
        async fn add_static_attachment(&self, owner: AttachmentOwner, attachment: StaticAttachment) -> Result<StaticAttachment, AddAttachmentError>;
        async fn add_header(&self, owner: AttachmentOwner, name: &str, value: &str) -> Result<MailHeader, AddAttachmentError>;
        async fn delete_mail(&self, mail_id: i64) -> Result<usize, DeleteMailError>;
        async fn set_campaigns_enabled(&self, campaign_ids: &[i64], enabled: bool) -> Result<u64, MailStoreError>;
        async fn mark_sent(&self, mail_id: i64) -> Result<(), UpdateMailError>;
        async fn mark_failed(&self, mail_id: i64, reason: &str) -> Result<(), UpdateMailError>;
        async fn is_blacklisted(&self, email: &EmailAddress) -> Result<bool, MailStoreError>;
        async fn blacklist(&self, email: &EmailAddress, reason: &str) -> Result<(), MailStoreError>;
        async fn template_name(&self, campaign_id: i64) -> Result<String, GetCampaignError>;
    }
}

/// Mailing service implementation
#[derive(Clone)]
pub struct MailServiceImpl<R>
where
    R: MailRepository,
{
    repo: Arc<R>,
    library: Arc<dyn StaticLibrary>,
    uploads: Arc<dyn UploadStore>,
}

impl<R> fmt::Debug for MailServiceImpl<R>
where
    R: MailRepository + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailServiceImpl")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl<R> MailServiceImpl<R>
where
    R: MailRepository,
{
    /// Create a new mailing service
    pub fn new(
        repo: Arc<R>,
        library: Arc<dyn StaticLibrary>,
        uploads: Arc<dyn UploadStore>,
    ) -> Self {
        Self {
            repo,
            library,
            uploads,
        }
    }

    async fn ensure_owner_exists(&self, owner: AttachmentOwner) -> Result<(), AddAttachmentError> {
        match owner {
            AttachmentOwner::Campaign(id) => {
                self.repo.get_campaign(id).await?;
            }
            AttachmentOwner::Mail(id) => {
                self.repo.get_mail(id).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<R> MailService for MailServiceImpl<R>
where
    R: MailRepository,
{
    async fn attach_upload(
        &self,
        mail_id: i64,
        filename: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<DynamicAttachment, AddAttachmentError> {
        validate_file_name(filename)?;
        validate_mime_type(mime_type)?;
        self.repo.get_mail(mail_id).await?;

        let stored_as = self.uploads.save(mail_id, filename, content).await?;
        let new_attachment = NewDynamicAttachment::new(mail_id, filename, mime_type, &stored_as)?;

        match self.repo.add_dynamic_attachment(&new_attachment).await {
            Ok(attachment) => {
                info!(mail_id, attachment = %stored_as, "upload attached to mail");

                Ok(attachment)
            }
            Err(err) => {
                if let Err(delete_err) = self.uploads.delete(&stored_as).await {
                    warn!(
                        attachment = %stored_as,
                        error = %delete_err,
                        "could not release orphaned upload"
                    );
                }

                Err(err.into())
            }
        }
    }

    async fn add_static_attachment(
        &self,
        owner: AttachmentOwner,
        attachment: StaticAttachment,
    ) -> Result<StaticAttachment, AddAttachmentError> {
        attachment.validate(self.library.as_ref()).await?;
        self.ensure_owner_exists(owner).await?;

        Ok(self.repo.add_static_attachment(owner, &attachment).await?)
    }

    async fn add_header(
        &self,
        owner: AttachmentOwner,
        name: &str,
        value: &str,
    ) -> Result<MailHeader, AddAttachmentError> {
        let header = MailHeader::new(name, value)?;
        self.ensure_owner_exists(owner).await?;

        self.repo.add_header(owner, &header).await?;

        Ok(header)
    }

    async fn delete_mail(&self, mail_id: i64) -> Result<usize, DeleteMailError> {
        let attachments = self.repo.delete_mail(mail_id).await?;
        let mut released = 0;

        for attachment in &attachments {
            match self.uploads.delete(&attachment.attachment).await {
                Ok(true) => released += 1,
                Ok(false) => warn!(
                    mail_id,
                    attachment = %attachment.attachment,
                    "attachment file was already gone"
                ),
                Err(err) => warn!(
                    mail_id,
                    attachment = %attachment.attachment,
                    error = %err,
                    "could not release attachment file"
                ),
            }
        }

        info!(mail_id, released, "mail deleted");

        Ok(released)
    }

    async fn set_campaigns_enabled(
        &self,
        campaign_ids: &[i64],
        enabled: bool,
    ) -> Result<u64, MailStoreError> {
        let changed = self.repo.set_campaigns_enabled(campaign_ids, enabled).await?;

        info!(?campaign_ids, enabled, changed, "campaigns updated");

        Ok(changed)
    }

    async fn mark_sent(&self, mail_id: i64) -> Result<(), UpdateMailError> {
        self.repo
            .update_mail_status(mail_id, MailStatus::Sent, "", Some(Utc::now()))
            .await
    }

    async fn mark_failed(&self, mail_id: i64, reason: &str) -> Result<(), UpdateMailError> {
        warn!(mail_id, reason, "mail delivery failed");

        self.repo
            .update_mail_status(mail_id, MailStatus::Failure, reason, None)
            .await
    }

    async fn is_blacklisted(&self, email: &EmailAddress) -> Result<bool, MailStoreError> {
        self.repo.is_blacklisted(email).await
    }

    async fn blacklist(&self, email: &EmailAddress, reason: &str) -> Result<(), MailStoreError> {
        self.repo
            .blacklist(&BlacklistEntry {
                email: email.clone(),
                reported_on: Utc::now(),
                reason: reason.to_string(),
            })
            .await
    }

    async fn template_name(&self, campaign_id: i64) -> Result<String, GetCampaignError> {
        Ok(self.repo.get_campaign(campaign_id).await?.template_name())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use mockall::predicate::{always, eq};
    use testresult::TestResult;

    use crate::domain::{
        attachments::{
            tests::{MockStaticLibrary, MockUploadStore},
            AttachmentError,
        },
        mailing::{errors::GetMailError, tests::MockMailRepository, Campaign, Mail},
    };

    use super::*;

    fn service(
        repo: MockMailRepository,
        library: MockStaticLibrary,
        uploads: MockUploadStore,
    ) -> MailServiceImpl<MockMailRepository> {
        MailServiceImpl::new(Arc::new(repo), Arc::new(library), Arc::new(uploads))
    }

    fn uploaded(mail_id: i64, attachment: &str) -> DynamicAttachment {
        DynamicAttachment {
            id: 1,
            mail_id,
            filename: String::new(),
            mime_type: String::new(),
            attachment: attachment.to_string(),
        }
    }

    #[tokio::test]
    async fn test_attach_upload() -> TestResult {
        let mut repo = MockMailRepository::new();
        let mut uploads = MockUploadStore::new();

        repo.expect_get_mail().returning(|id| {
            Ok(Mail {
                id,
                ..Default::default()
            })
        });
        uploads
            .expect_save()
            .with(eq(7), eq("report.pdf"), always())
            .times(1)
            .returning(|_, _, _| Ok("mailing/attachments/2016/02/09/report.pdf".to_string()));
        repo.expect_add_dynamic_attachment()
            .times(1)
            .returning(|new| Ok(new.clone().into_attachment(5)));

        let service = service(repo, MockStaticLibrary::new(), uploads);

        let attachment = service
            .attach_upload(7, "report.pdf", "", b"%PDF-1.4")
            .await?;

        assert_eq!(attachment.id, 5);
        assert_eq!(
            attachment.attachment,
            "mailing/attachments/2016/02/09/report.pdf"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_attach_upload_rejects_invalid_mime_type_before_saving() {
        let mut uploads = MockUploadStore::new();

        uploads.expect_save().times(0);

        let service = service(MockMailRepository::new(), MockStaticLibrary::new(), uploads);

        let result = service.attach_upload(7, "report.pdf", "pdf", b"").await;

        assert!(matches!(
            result,
            Err(AddAttachmentError::Attachment(AttachmentError::InvalidMimeType(_)))
        ));
    }

    #[tokio::test]
    async fn test_attach_upload_releases_file_when_record_fails() {
        let mut repo = MockMailRepository::new();
        let mut uploads = MockUploadStore::new();

        repo.expect_get_mail().returning(|id| {
            Ok(Mail {
                id,
                ..Default::default()
            })
        });
        uploads
            .expect_save()
            .returning(|_, _, _| Ok("mailing/report.pdf".to_string()));
        repo.expect_add_dynamic_attachment()
            .returning(|_| Err(MailStoreError::UnknownError(anyhow!("offline"))));
        uploads
            .expect_delete()
            .with(eq("mailing/report.pdf"))
            .times(1)
            .returning(|_| Ok(true));

        let service = service(repo, MockStaticLibrary::new(), uploads);

        let result = service.attach_upload(7, "report.pdf", "", b"").await;

        assert!(matches!(result, Err(AddAttachmentError::UnknownError(_))));
    }

    #[tokio::test]
    async fn test_attach_upload_to_missing_mail() {
        let mut repo = MockMailRepository::new();
        let mut uploads = MockUploadStore::new();

        repo.expect_get_mail()
            .returning(|id| Err(GetMailError::MailNotFound(id)));
        uploads.expect_save().times(0);

        let service = service(repo, MockStaticLibrary::new(), uploads);

        let result = service.attach_upload(7, "report.pdf", "", b"").await;

        assert!(matches!(result, Err(AddAttachmentError::MailNotFound(7))));
    }

    #[tokio::test]
    async fn test_add_static_attachment_validates_against_library() -> TestResult {
        let mut repo = MockMailRepository::new();
        let mut library = MockStaticLibrary::new();

        library
            .expect_validate()
            .with(eq("brochures/spring.pdf"))
            .returning(|_| Ok(()));
        repo.expect_get_campaign().with(eq(3)).returning(|id| {
            Ok(Campaign {
                id,
                ..Default::default()
            })
        });
        repo.expect_add_static_attachment()
            .with(eq(AttachmentOwner::Campaign(3)), always())
            .times(1)
            .returning(|_, attachment| {
                Ok(StaticAttachment {
                    id: 9,
                    ..attachment.clone()
                })
            });

        let service = service(repo, library, MockUploadStore::new());

        let attachment = service
            .add_static_attachment(
                AttachmentOwner::Campaign(3),
                StaticAttachment::new("brochures/spring.pdf"),
            )
            .await?;

        assert_eq!(attachment.id, 9);

        Ok(())
    }

    #[tokio::test]
    async fn test_add_static_attachment_outside_library() {
        let mut repo = MockMailRepository::new();
        let mut library = MockStaticLibrary::new();

        library
            .expect_validate()
            .returning(|path| Err(AttachmentError::InvalidPath(path.to_string())));
        repo.expect_add_static_attachment().times(0);

        let service = service(repo, library, MockUploadStore::new());

        let result = service
            .add_static_attachment(
                AttachmentOwner::Mail(1),
                StaticAttachment::new("../secrets.txt"),
            )
            .await;

        assert!(matches!(
            result,
            Err(AddAttachmentError::Attachment(AttachmentError::InvalidPath(_)))
        ));
    }

    #[tokio::test]
    async fn test_add_header_rejects_invalid_name() {
        let mut repo = MockMailRepository::new();

        repo.expect_add_header().times(0);

        let service = service(repo, MockStaticLibrary::new(), MockUploadStore::new());

        let result = service
            .add_header(AttachmentOwner::Mail(1), "X Bad", "value")
            .await;

        assert!(matches!(result, Err(AddAttachmentError::Header(_))));
    }

    #[tokio::test]
    async fn test_delete_mail_releases_dynamic_attachments() -> TestResult {
        let mut repo = MockMailRepository::new();
        let mut uploads = MockUploadStore::new();

        repo.expect_delete_mail().with(eq(4)).times(1).returning(|id| {
            Ok(vec![
                uploaded(id, "mailing/a.pdf"),
                uploaded(id, "mailing/b.pdf"),
                uploaded(id, "mailing/gone.pdf"),
            ])
        });
        uploads
            .expect_delete()
            .times(3)
            .returning(|name| Ok(name != "mailing/gone.pdf"));

        let service = service(repo, MockStaticLibrary::new(), uploads);

        assert_eq!(service.delete_mail(4).await?, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_missing_mail_releases_nothing() {
        let mut repo = MockMailRepository::new();
        let mut uploads = MockUploadStore::new();

        repo.expect_delete_mail()
            .returning(|id| Err(DeleteMailError::MailNotFound(id)));
        uploads.expect_delete().times(0);

        let service = service(repo, MockStaticLibrary::new(), uploads);

        let result = service.delete_mail(4).await;

        assert!(matches!(result, Err(DeleteMailError::MailNotFound(4))));
    }

    #[tokio::test]
    async fn test_mark_sent_and_failed() -> TestResult {
        let mut repo = MockMailRepository::new();

        repo.expect_update_mail_status()
            .withf(|id, status, reason, sent_on| {
                *id == 1 && *status == MailStatus::Sent && reason.is_empty() && sent_on.is_some()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        repo.expect_update_mail_status()
            .withf(|id, status, reason, sent_on| {
                *id == 2
                    && *status == MailStatus::Failure
                    && reason == "mailbox full"
                    && sent_on.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let service = service(repo, MockStaticLibrary::new(), MockUploadStore::new());

        service.mark_sent(1).await?;
        service.mark_failed(2, "mailbox full").await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_template_name() -> TestResult {
        let mut repo = MockMailRepository::new();

        repo.expect_get_campaign().returning(|id| {
            Ok(Campaign {
                id,
                key: "welcome".to_string(),
                ..Default::default()
            })
        });

        let service = service(repo, MockStaticLibrary::new(), MockUploadStore::new());

        assert_eq!(service.template_name(1).await?, "mailing/welcome.html");

        Ok(())
    }

    #[tokio::test]
    async fn test_blacklist_appends_entry() -> TestResult {
        let mut repo = MockMailRepository::new();

        repo.expect_blacklist()
            .withf(|entry| {
                entry.email.as_str() == "bounce@example.com" && entry.reason == "hard bounce"
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(repo, MockStaticLibrary::new(), MockUploadStore::new());

        service
            .blacklist(&EmailAddress::new_unchecked("bounce@example.com"), "hard bounce")
            .await?;

        Ok(())
    }
}
