//! Postgres implementation of the MailRepository trait, using runtime-checked queries

use anyhow::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, Error::RowNotFound, FromRow};

use crate::{
    domain::{
        attachments::{DynamicAttachment, NewDynamicAttachment, StaticAttachment},
        communication::email_addresses::EmailAddress,
        mailing::{
            errors::{
                DeleteMailError, GetCampaignError, GetMailError, MailStoreError, UpdateMailError,
            },
            AttachmentOwner, BlacklistEntry, Campaign, Mail, MailHeader, MailRepository,
            MailStatus,
        },
    },
    infrastructure::db::postgres::{unknown, PostgresDatabase},
};

#[derive(FromRow)]
struct CampaignRecord {
    id: i64,
    key: String,
    name: String,
    subject: String,
    prefix_subject: bool,
    template_file: String,
    subscription_type_id: Option<i64>,
    is_enabled: bool,
}

impl From<CampaignRecord> for Campaign {
    fn from(record: CampaignRecord) -> Self {
        Campaign {
            id: record.id,
            key: record.key,
            name: record.name,
            subject: record.subject,
            prefix_subject: record.prefix_subject,
            template_file: record.template_file,
            subscription_type_id: record.subscription_type_id,
            is_enabled: record.is_enabled,
        }
    }
}

#[derive(FromRow)]
struct MailRecord {
    id: i64,
    campaign_id: Option<i64>,
    scheduled_on: Option<DateTime<Utc>>,
    sent_on: Option<DateTime<Utc>>,
    status: String,
    failure_reason: String,
    subject: String,
    html_body: String,
    text_body: String,
}

impl TryFrom<MailRecord> for Mail {
    type Error = Error;

    fn try_from(record: MailRecord) -> Result<Self, Self::Error> {
        Ok(Mail {
            id: record.id,
            campaign_id: record.campaign_id,
            scheduled_on: record.scheduled_on,
            sent_on: record.sent_on,
            status: record.status.parse()?,
            failure_reason: record.failure_reason,
            subject: record.subject,
            html_body: record.html_body,
            text_body: record.text_body,
        })
    }
}

#[derive(FromRow)]
struct HeaderRecord {
    name: String,
    value: String,
}

#[derive(FromRow)]
struct StaticAttachmentRecord {
    id: i64,
    filename: String,
    mime_type: String,
    attachment: String,
}

impl From<StaticAttachmentRecord> for StaticAttachment {
    fn from(record: StaticAttachmentRecord) -> Self {
        StaticAttachment {
            id: record.id,
            filename: record.filename,
            mime_type: record.mime_type,
            attachment: record.attachment,
        }
    }
}

#[derive(FromRow)]
struct DynamicAttachmentRecord {
    id: i64,
    mail_id: i64,
    filename: String,
    mime_type: String,
    attachment: String,
}

impl From<DynamicAttachmentRecord> for DynamicAttachment {
    fn from(record: DynamicAttachmentRecord) -> Self {
        DynamicAttachment {
            id: record.id,
            mail_id: record.mail_id,
            filename: record.filename,
            mime_type: record.mime_type,
            attachment: record.attachment,
        }
    }
}

/// Table and owner column holding headers for `owner`
fn header_table(owner: AttachmentOwner) -> (&'static str, &'static str, i64) {
    match owner {
        AttachmentOwner::Campaign(id) => ("mailing_campaign_headers", "campaign_id", id),
        AttachmentOwner::Mail(id) => ("mailing_mail_headers", "mail_id", id),
    }
}

/// Table and owner column holding static attachments for `owner`
fn static_attachment_table(owner: AttachmentOwner) -> (&'static str, &'static str, i64) {
    match owner {
        AttachmentOwner::Campaign(id) => {
            ("mailing_campaign_static_attachments", "campaign_id", id)
        }
        AttachmentOwner::Mail(id) => ("mailing_mail_static_attachments", "mail_id", id),
    }
}

#[async_trait]
impl MailRepository for PostgresDatabase {
    #[mutants::skip]
    async fn get_mail(&self, id: i64) -> Result<Mail, GetMailError> {
        Ok(query_as::<_, MailRecord>(
            r#"
            SELECT
                id,
                campaign_id,
                scheduled_on,
                sent_on,
                status,
                failure_reason,
                subject,
                html_body,
                text_body
            FROM mailing_mails
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            RowNotFound => GetMailError::MailNotFound(id),
            _ => GetMailError::UnknownError(unknown(err)),
        })?
        .try_into()?)
    }

    #[mutants::skip]
    async fn get_campaign(&self, id: i64) -> Result<Campaign, GetCampaignError> {
        Ok(query_as::<_, CampaignRecord>(
            r#"
            SELECT
                id,
                key,
                name,
                subject,
                prefix_subject,
                template_file,
                subscription_type_id,
                is_enabled
            FROM mailing_campaigns
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            RowNotFound => GetCampaignError::CampaignNotFound(id),
            _ => GetCampaignError::UnknownError(unknown(err)),
        })?
        .into())
    }

    #[mutants::skip]
    async fn headers(&self, owner: AttachmentOwner) -> Result<Vec<MailHeader>, MailStoreError> {
        let (table, column, id) = header_table(owner);

        let records = query_as::<_, HeaderRecord>(&format!(
            "SELECT name, value FROM {table} WHERE {column} = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records
            .into_iter()
            .map(|record| MailHeader::new_unchecked(&record.name, &record.value))
            .collect())
    }

    #[mutants::skip]
    async fn add_header(
        &self,
        owner: AttachmentOwner,
        header: &MailHeader,
    ) -> Result<(), MailStoreError> {
        let (table, column, id) = header_table(owner);

        query(&format!(
            "INSERT INTO {table} ({column}, name, value) VALUES ($1, $2, $3)"
        ))
        .bind(id)
        .bind(header.name())
        .bind(header.value())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[mutants::skip]
    async fn static_attachments(
        &self,
        owner: AttachmentOwner,
    ) -> Result<Vec<StaticAttachment>, MailStoreError> {
        let (table, column, id) = static_attachment_table(owner);

        let records = query_as::<_, StaticAttachmentRecord>(&format!(
            "SELECT id, filename, mime_type, attachment FROM {table} WHERE {column} = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[mutants::skip]
    async fn add_static_attachment(
        &self,
        owner: AttachmentOwner,
        attachment: &StaticAttachment,
    ) -> Result<StaticAttachment, MailStoreError> {
        let (table, column, id) = static_attachment_table(owner);

        let record = query_as::<_, StaticAttachmentRecord>(&format!(
            r#"
            INSERT INTO {table} ({column}, filename, mime_type, attachment)
            VALUES ($1, $2, $3, $4)
            RETURNING id, filename, mime_type, attachment
            "#
        ))
        .bind(id)
        .bind(&attachment.filename)
        .bind(&attachment.mime_type)
        .bind(&attachment.attachment)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    #[mutants::skip]
    async fn dynamic_attachments(
        &self,
        mail_id: i64,
    ) -> Result<Vec<DynamicAttachment>, MailStoreError> {
        let records = query_as::<_, DynamicAttachmentRecord>(
            r#"
            SELECT id, mail_id, filename, mime_type, attachment
            FROM mailing_mail_dynamic_attachments
            WHERE mail_id = $1
            ORDER BY id
            "#,
        )
        .bind(mail_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[mutants::skip]
    async fn add_dynamic_attachment(
        &self,
        attachment: &NewDynamicAttachment,
    ) -> Result<DynamicAttachment, MailStoreError> {
        let record = query_as::<_, DynamicAttachmentRecord>(
            r#"
            INSERT INTO mailing_mail_dynamic_attachments (mail_id, filename, mime_type, attachment)
            VALUES ($1, $2, $3, $4)
            RETURNING id, mail_id, filename, mime_type, attachment
            "#,
        )
        .bind(attachment.mail_id())
        .bind(attachment.filename())
        .bind(attachment.mime_type())
        .bind(attachment.attachment())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    #[mutants::skip]
    async fn delete_mail(&self, id: i64) -> Result<Vec<DynamicAttachment>, DeleteMailError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| DeleteMailError::UnknownError(unknown(err)))?;

        let records = query_as::<_, DynamicAttachmentRecord>(
            r#"
            DELETE FROM mailing_mail_dynamic_attachments
            WHERE mail_id = $1
            RETURNING id, mail_id, filename, mime_type, attachment
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|err| DeleteMailError::UnknownError(unknown(err)))?;

        let result = query("DELETE FROM mailing_mails WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|err| DeleteMailError::UnknownError(unknown(err)))?;

        // Dropping the transaction rolls it back.
        if result.rows_affected() == 0 {
            return Err(DeleteMailError::MailNotFound(id));
        }

        tx.commit()
            .await
            .map_err(|err| DeleteMailError::UnknownError(unknown(err)))?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[mutants::skip]
    async fn set_campaigns_enabled(
        &self,
        ids: &[i64],
        enabled: bool,
    ) -> Result<u64, MailStoreError> {
        let result = query(
            r#"
            UPDATE mailing_campaigns
            SET is_enabled = $2
            WHERE id = ANY($1) AND is_enabled <> $2
            "#,
        )
        .bind(ids)
        .bind(enabled)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[mutants::skip]
    async fn update_mail_status(
        &self,
        id: i64,
        status: MailStatus,
        failure_reason: &str,
        sent_on: Option<DateTime<Utc>>,
    ) -> Result<(), UpdateMailError> {
        let result = query(
            r#"
            UPDATE mailing_mails
            SET status = $2,
                failure_reason = $3,
                sent_on = COALESCE($4, sent_on)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(failure_reason)
        .bind(sent_on)
        .execute(&self.pool)
        .await
        .map_err(|err| UpdateMailError::UnknownError(unknown(err)))?;

        if result.rows_affected() == 0 {
            return Err(UpdateMailError::MailNotFound(id));
        }

        Ok(())
    }

    #[mutants::skip]
    async fn is_blacklisted(&self, email: &EmailAddress) -> Result<bool, MailStoreError> {
        Ok(query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM mailing_blacklist WHERE lower(email) = lower($1)
            )
            "#,
        )
        .bind(email.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    #[mutants::skip]
    async fn blacklist(&self, entry: &BlacklistEntry) -> Result<(), MailStoreError> {
        query(
            r#"
            INSERT INTO mailing_blacklist (email, reported_on, reason)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(entry.email.as_str())
        .bind(entry.reported_on)
        .bind(&entry.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
