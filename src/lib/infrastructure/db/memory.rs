//! In-memory implementation of the repositories, for development and tests.
//!
//! Everything is kept behind one mutex and lost when the value is dropped. Writes follow the
//! same conditional rules as the Postgres adapter, so concurrent reconciliation behaves alike.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    attachments::{DynamicAttachment, NewDynamicAttachment, StaticAttachment},
    communication::email_addresses::EmailAddress,
    mailing::{
        errors::{
            DeleteMailError, GetCampaignError, GetMailError, MailStoreError, UpdateMailError,
        },
        AttachmentOwner, BlacklistEntry, Campaign, Mail, MailHeader, MailRepository, MailStatus,
    },
    subscriptions::{
        errors::{GetSubscriptionTypeError, SubscriptionStoreError, SubscriptionWriteError},
        Subscription, SubscriptionRepository, SubscriptionType,
    },
};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    subscription_types: BTreeMap<i64, SubscriptionType>,
    subscriptions: HashMap<(EmailAddress, i64), bool>,
    campaigns: BTreeMap<i64, Campaign>,
    mails: BTreeMap<i64, Mail>,
    headers: HashMap<AttachmentOwner, Vec<MailHeader>>,
    static_attachments: HashMap<AttachmentOwner, Vec<StaticAttachment>>,
    dynamic_attachments: BTreeMap<i64, Vec<DynamicAttachment>>,
    blacklist: Vec<BlacklistEntry>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory database
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    subscription_writes: Arc<AtomicUsize>,
}

impl InMemoryDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscription records created or updated so far
    pub fn subscription_writes(&self) -> usize {
        self.subscription_writes.load(Ordering::SeqCst)
    }

    /// Store a subscription type, assigning its ID
    pub async fn insert_subscription_type(&self, mut subscription_type: SubscriptionType) -> i64 {
        let mut tables = self.tables.lock().await;

        subscription_type.id = tables.next_id();
        let id = subscription_type.id;
        tables.subscription_types.insert(id, subscription_type);

        id
    }

    /// Store a campaign, assigning its ID
    pub async fn insert_campaign(&self, mut campaign: Campaign) -> i64 {
        let mut tables = self.tables.lock().await;

        campaign.id = tables.next_id();
        let id = campaign.id;
        tables.campaigns.insert(id, campaign);

        id
    }

    /// Store a mail, assigning its ID
    pub async fn insert_mail(&self, mut mail: Mail) -> i64 {
        let mut tables = self.tables.lock().await;

        mail.id = tables.next_id();
        let id = mail.id;
        tables.mails.insert(id, mail);

        id
    }

    /// The stored consent record, bypassing the repository interface
    pub async fn subscription(&self, email: &EmailAddress, subscription_type_id: i64) -> Option<bool> {
        self.tables
            .lock()
            .await
            .subscriptions
            .get(&(email.clone(), subscription_type_id))
            .copied()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryDatabase {
    async fn list_subscription_types(&self) -> Result<Vec<SubscriptionType>, SubscriptionStoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .subscription_types
            .values()
            .cloned()
            .collect())
    }

    async fn get_subscription_type(
        &self,
        id: i64,
    ) -> Result<SubscriptionType, GetSubscriptionTypeError> {
        self.tables
            .lock()
            .await
            .subscription_types
            .get(&id)
            .cloned()
            .ok_or(GetSubscriptionTypeError::SubscriptionTypeNotFound(id))
    }

    async fn list_subscriptions(
        &self,
        email: &EmailAddress,
    ) -> Result<Vec<Subscription>, SubscriptionStoreError> {
        let tables = self.tables.lock().await;

        let mut subscriptions: Vec<Subscription> = tables
            .subscriptions
            .iter()
            .filter(|((record_email, _), _)| record_email == email)
            .map(|((record_email, subscription_type_id), subscribed)| Subscription {
                email: record_email.clone(),
                subscription_type_id: *subscription_type_id,
                subscribed: *subscribed,
            })
            .collect();

        subscriptions.sort_by_key(|subscription| subscription.subscription_type_id);

        Ok(subscriptions)
    }

    async fn get_subscription(
        &self,
        email: &EmailAddress,
        subscription_type_id: i64,
    ) -> Result<Option<Subscription>, SubscriptionStoreError> {
        Ok(self
            .subscription(email, subscription_type_id)
            .await
            .map(|subscribed| Subscription {
                email: email.clone(),
                subscription_type_id,
                subscribed,
            }))
    }

    async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), SubscriptionWriteError> {
        let mut tables = self.tables.lock().await;
        let key = (subscription.email.clone(), subscription.subscription_type_id);

        if tables.subscriptions.contains_key(&key) {
            return Err(SubscriptionWriteError::Conflict);
        }

        tables.subscriptions.insert(key, subscription.subscribed);
        self.subscription_writes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
        previous: bool,
    ) -> Result<(), SubscriptionWriteError> {
        let mut tables = self.tables.lock().await;
        let key = (subscription.email.clone(), subscription.subscription_type_id);

        match tables.subscriptions.get_mut(&key) {
            Some(subscribed) if *subscribed == previous => {
                *subscribed = subscription.subscribed;
                self.subscription_writes.fetch_add(1, Ordering::SeqCst);

                Ok(())
            }
            _ => Err(SubscriptionWriteError::Conflict),
        }
    }
}

#[async_trait]
impl MailRepository for InMemoryDatabase {
    async fn get_mail(&self, id: i64) -> Result<Mail, GetMailError> {
        self.tables
            .lock()
            .await
            .mails
            .get(&id)
            .cloned()
            .ok_or(GetMailError::MailNotFound(id))
    }

    async fn get_campaign(&self, id: i64) -> Result<Campaign, GetCampaignError> {
        self.tables
            .lock()
            .await
            .campaigns
            .get(&id)
            .cloned()
            .ok_or(GetCampaignError::CampaignNotFound(id))
    }

    async fn headers(&self, owner: AttachmentOwner) -> Result<Vec<MailHeader>, MailStoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .headers
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_header(
        &self,
        owner: AttachmentOwner,
        header: &MailHeader,
    ) -> Result<(), MailStoreError> {
        self.tables
            .lock()
            .await
            .headers
            .entry(owner)
            .or_default()
            .push(header.clone());

        Ok(())
    }

    async fn static_attachments(
        &self,
        owner: AttachmentOwner,
    ) -> Result<Vec<StaticAttachment>, MailStoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .static_attachments
            .get(&owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_static_attachment(
        &self,
        owner: AttachmentOwner,
        attachment: &StaticAttachment,
    ) -> Result<StaticAttachment, MailStoreError> {
        let mut tables = self.tables.lock().await;

        let stored = StaticAttachment {
            id: tables.next_id(),
            ..attachment.clone()
        };
        tables
            .static_attachments
            .entry(owner)
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn dynamic_attachments(
        &self,
        mail_id: i64,
    ) -> Result<Vec<DynamicAttachment>, MailStoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .dynamic_attachments
            .get(&mail_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_dynamic_attachment(
        &self,
        attachment: &NewDynamicAttachment,
    ) -> Result<DynamicAttachment, MailStoreError> {
        let mut tables = self.tables.lock().await;

        let stored = attachment.clone().into_attachment(tables.next_id());
        tables
            .dynamic_attachments
            .entry(stored.mail_id)
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn delete_mail(&self, id: i64) -> Result<Vec<DynamicAttachment>, DeleteMailError> {
        let mut tables = self.tables.lock().await;

        if tables.mails.remove(&id).is_none() {
            return Err(DeleteMailError::MailNotFound(id));
        }

        tables.headers.remove(&AttachmentOwner::Mail(id));
        tables.static_attachments.remove(&AttachmentOwner::Mail(id));

        Ok(tables.dynamic_attachments.remove(&id).unwrap_or_default())
    }

    async fn set_campaigns_enabled(
        &self,
        ids: &[i64],
        enabled: bool,
    ) -> Result<u64, MailStoreError> {
        let mut tables = self.tables.lock().await;
        let mut changed = 0;

        for id in ids {
            if let Some(campaign) = tables.campaigns.get_mut(id) {
                if campaign.is_enabled != enabled {
                    campaign.is_enabled = enabled;
                    changed += 1;
                }
            }
        }

        Ok(changed)
    }

    async fn update_mail_status(
        &self,
        id: i64,
        status: MailStatus,
        failure_reason: &str,
        sent_on: Option<DateTime<Utc>>,
    ) -> Result<(), UpdateMailError> {
        let mut tables = self.tables.lock().await;
        let mail = tables
            .mails
            .get_mut(&id)
            .ok_or(UpdateMailError::MailNotFound(id))?;

        mail.status = status;
        mail.failure_reason = failure_reason.to_string();
        mail.sent_on = sent_on.or(mail.sent_on);

        Ok(())
    }

    async fn is_blacklisted(&self, email: &EmailAddress) -> Result<bool, MailStoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .blacklist
            .iter()
            .any(|entry| entry.email.matches(email)))
    }

    async fn blacklist(&self, entry: &BlacklistEntry) -> Result<(), MailStoreError> {
        self.tables.lock().await.blacklist.push(entry.clone());

        Ok(())
    }
}
