//! Postgres implementation of the SubscriptionRepository trait, using runtime-checked queries

use async_trait::async_trait;
use sqlx::{query, query_as, Error::RowNotFound, FromRow};

use crate::{
    domain::{
        communication::email_addresses::EmailAddress,
        subscriptions::{
            errors::{GetSubscriptionTypeError, SubscriptionStoreError, SubscriptionWriteError},
            Subscription, SubscriptionRepository, SubscriptionType,
        },
    },
    infrastructure::db::postgres::{unknown, PostgresDatabase},
};

#[derive(FromRow)]
struct SubscriptionTypeRecord {
    id: i64,
    name: String,
    subscribed_by_default: bool,
    description: String,
}

impl From<SubscriptionTypeRecord> for SubscriptionType {
    fn from(record: SubscriptionTypeRecord) -> Self {
        SubscriptionType {
            id: record.id,
            name: record.name,
            subscribed_by_default: record.subscribed_by_default,
            description: record.description,
        }
    }
}

#[derive(FromRow)]
struct SubscriptionRecord {
    email: String,
    subscription_type_id: i64,
    subscribed: bool,
}

impl From<SubscriptionRecord> for Subscription {
    fn from(record: SubscriptionRecord) -> Self {
        Subscription {
            email: EmailAddress::new_unchecked(&record.email),
            subscription_type_id: record.subscription_type_id,
            subscribed: record.subscribed,
        }
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresDatabase {
    #[mutants::skip]
    async fn list_subscription_types(&self) -> Result<Vec<SubscriptionType>, SubscriptionStoreError> {
        let records = query_as::<_, SubscriptionTypeRecord>(
            r#"
            SELECT id, name, subscribed_by_default, description
            FROM mailing_subscription_types
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[mutants::skip]
    async fn get_subscription_type(
        &self,
        id: i64,
    ) -> Result<SubscriptionType, GetSubscriptionTypeError> {
        Ok(query_as::<_, SubscriptionTypeRecord>(
            r#"
            SELECT id, name, subscribed_by_default, description
            FROM mailing_subscription_types
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            RowNotFound => GetSubscriptionTypeError::SubscriptionTypeNotFound(id),
            _ => GetSubscriptionTypeError::UnknownError(unknown(err)),
        })?
        .into())
    }

    #[mutants::skip]
    async fn list_subscriptions(
        &self,
        email: &EmailAddress,
    ) -> Result<Vec<Subscription>, SubscriptionStoreError> {
        let records = query_as::<_, SubscriptionRecord>(
            r#"
            SELECT email, subscription_type_id, subscribed
            FROM mailing_subscriptions
            WHERE email = $1
            ORDER BY subscription_type_id
            "#,
        )
        .bind(email.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    #[mutants::skip]
    async fn get_subscription(
        &self,
        email: &EmailAddress,
        subscription_type_id: i64,
    ) -> Result<Option<Subscription>, SubscriptionStoreError> {
        let record = query_as::<_, SubscriptionRecord>(
            r#"
            SELECT email, subscription_type_id, subscribed
            FROM mailing_subscriptions
            WHERE email = $1 AND subscription_type_id = $2
            "#,
        )
        .bind(email.as_str())
        .bind(subscription_type_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Into::into))
    }

    #[mutants::skip]
    async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), SubscriptionWriteError> {
        // A concurrent insert for the same key surfaces as a unique violation.
        query(
            r#"
            INSERT INTO mailing_subscriptions (email, subscription_type_id, subscribed)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(subscription.email.as_str())
        .bind(subscription.subscription_type_id)
        .bind(subscription.subscribed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[mutants::skip]
    async fn update_subscription(
        &self,
        subscription: &Subscription,
        previous: bool,
    ) -> Result<(), SubscriptionWriteError> {
        let result = query(
            r#"
            UPDATE mailing_subscriptions
            SET subscribed = $3
            WHERE email = $1 AND subscription_type_id = $2 AND subscribed = $4
            "#,
        )
        .bind(subscription.email.as_str())
        .bind(subscription.subscription_type_id)
        .bind(subscription.subscribed)
        .bind(previous)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SubscriptionWriteError::Conflict);
        }

        Ok(())
    }
}
