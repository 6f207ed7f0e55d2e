//! Subscription repository module

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    communication::email_addresses::EmailAddress,
    subscriptions::{
        errors::{GetSubscriptionTypeError, SubscriptionStoreError, SubscriptionWriteError},
        Subscription, SubscriptionType,
    },
};

/// Subscription repository.
///
/// Writes are conditional on the state the caller read: implementations must report
/// [`SubscriptionWriteError::Conflict`] instead of overwriting a concurrent change.
#[async_trait]
pub trait SubscriptionRepository: Clone + Send + Sync + 'static {
    /// List every subscription type, ordered by ID
    async fn list_subscription_types(&self) -> Result<Vec<SubscriptionType>, SubscriptionStoreError>;

    /// Get a subscription type by its ID
    async fn get_subscription_type(&self, id: i64)
        -> Result<SubscriptionType, GetSubscriptionTypeError>;

    /// List every explicit record for `email` in one read
    async fn list_subscriptions(
        &self,
        email: &EmailAddress,
    ) -> Result<Vec<Subscription>, SubscriptionStoreError>;

    /// Get the record for `email` and one subscription type
    async fn get_subscription(
        &self,
        email: &EmailAddress,
        subscription_type_id: i64,
    ) -> Result<Option<Subscription>, SubscriptionStoreError>;

    /// Insert a record. Conflicts if a record for the same key already exists.
    async fn create_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<(), SubscriptionWriteError>;

    /// Set `subscription.subscribed` on an existing record. Conflicts unless the stored value
    /// is still `previous`.
    async fn update_subscription(
        &self,
        subscription: &Subscription,
        previous: bool,
    ) -> Result<(), SubscriptionWriteError>;
}

#[cfg(test)]
mock! {
    pub SubscriptionRepository {}

    impl Clone for SubscriptionRepository {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl SubscriptionRepository for SubscriptionRepository {
        async fn list_subscription_types(&self) -> Result<Vec<SubscriptionType>, SubscriptionStoreError>;
        async fn get_subscription_type(&self, id: i64) -> Result<SubscriptionType, GetSubscriptionTypeError>;
        async fn list_subscriptions(&self, email: &EmailAddress) -> Result<Vec<Subscription>, SubscriptionStoreError>;
        async fn get_subscription(&self, email: &EmailAddress, subscription_type_id: i64) -> Result<Option<Subscription>, SubscriptionStoreError>;
        async fn create_subscription(&self, subscription: &Subscription) -> Result<(), SubscriptionWriteError>;
        async fn update_subscription(&self, subscription: &Subscription, previous: bool) -> Result<(), SubscriptionWriteError>;
    }
}
