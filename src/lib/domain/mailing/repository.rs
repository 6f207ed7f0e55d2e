//! Mailing repository module

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    attachments::{DynamicAttachment, NewDynamicAttachment, StaticAttachment},
    communication::email_addresses::EmailAddress,
    mailing::{
        errors::{
            DeleteMailError, GetCampaignError, GetMailError, MailStoreError, UpdateMailError,
        },
        AttachmentOwner, BlacklistEntry, Campaign, Mail, MailHeader, MailStatus,
    },
};

/// Mailing repository
#[async_trait]
pub trait MailRepository: Clone + Send + Sync + 'static {
    /// Get a mail by its ID
    async fn get_mail(&self, id: i64) -> Result<Mail, GetMailError>;

    /// Get a campaign by its ID
    async fn get_campaign(&self, id: i64) -> Result<Campaign, GetCampaignError>;

    /// Headers of a campaign or a mail, in insertion order
    async fn headers(&self, owner: AttachmentOwner) -> Result<Vec<MailHeader>, MailStoreError>;

    /// Store a header for a campaign or a mail
    async fn add_header(
        &self,
        owner: AttachmentOwner,
        header: &MailHeader,
    ) -> Result<(), MailStoreError>;

    /// Static attachments of a campaign or a mail, in insertion order
    async fn static_attachments(
        &self,
        owner: AttachmentOwner,
    ) -> Result<Vec<StaticAttachment>, MailStoreError>;

    /// Store a static attachment reference and return it with its assigned ID
    async fn add_static_attachment(
        &self,
        owner: AttachmentOwner,
        attachment: &StaticAttachment,
    ) -> Result<StaticAttachment, MailStoreError>;

    /// Dynamic attachments of a mail, in insertion order
    async fn dynamic_attachments(
        &self,
        mail_id: i64,
    ) -> Result<Vec<DynamicAttachment>, MailStoreError>;

    /// Record an uploaded file against its mail
    async fn add_dynamic_attachment(
        &self,
        attachment: &NewDynamicAttachment,
    ) -> Result<DynamicAttachment, MailStoreError>;

    /// Delete a mail with its headers and attachment records.
    ///
    /// # Returns
    /// The dynamic attachment records that were removed, so their files can be released.
    async fn delete_mail(&self, id: i64) -> Result<Vec<DynamicAttachment>, DeleteMailError>;

    /// Enable or disable campaigns. Returns how many campaigns were changed.
    async fn set_campaigns_enabled(
        &self,
        ids: &[i64],
        enabled: bool,
    ) -> Result<u64, MailStoreError>;

    /// Record a delivery state change
    async fn update_mail_status(
        &self,
        id: i64,
        status: MailStatus,
        failure_reason: &str,
        sent_on: Option<DateTime<Utc>>,
    ) -> Result<(), UpdateMailError>;

    /// Whether `email` has been blacklisted
    async fn is_blacklisted(&self, email: &EmailAddress) -> Result<bool, MailStoreError>;

    /// Append a blacklist entry
    async fn blacklist(&self, entry: &BlacklistEntry) -> Result<(), MailStoreError>;
}

#[cfg(test)]
mock! {
    pub MailRepository {}

    impl Clone for MailRepository {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl MailRepository for MailRepository {
        async fn get_mail(&self, id: i64) -> Result<Mail, GetMailError>;
        async fn get_campaign(&self, id: i64) -> Result<Campaign, GetCampaignError>;
        async fn headers(&self, owner: AttachmentOwner) -> Result<Vec<MailHeader>, MailStoreError>;
        async fn add_header(&self, owner: AttachmentOwner, header: &MailHeader) -> Result<(), MailStoreError>;
        async fn static_attachments(&self, owner: AttachmentOwner) -> Result<Vec<StaticAttachment>, MailStoreError>;
        async fn add_static_attachment(&self, owner: AttachmentOwner, attachment: &StaticAttachment) -> Result<StaticAttachment, MailStoreError>;
        async fn dynamic_attachments(&self, mail_id: i64) -> Result<Vec<DynamicAttachment>, MailStoreError>;
        async fn add_dynamic_attachment(&self, attachment: &NewDynamicAttachment) -> Result<DynamicAttachment, MailStoreError>;
        async fn delete_mail(&self, id: i64) -> Result<Vec<DynamicAttachment>, DeleteMailError>;
        async fn set_campaigns_enabled(&self, ids: &[i64], enabled: bool) -> Result<u64, MailStoreError>;
        async fn update_mail_status(&self, id: i64, status: MailStatus, failure_reason: &str, sent_on: Option<DateTime<Utc>>) -> Result<(), UpdateMailError>;
        async fn is_blacklisted(&self, email: &EmailAddress) -> Result<bool, MailStoreError>;
        async fn blacklist(&self, entry: &BlacklistEntry) -> Result<(), MailStoreError>;
    }
}
