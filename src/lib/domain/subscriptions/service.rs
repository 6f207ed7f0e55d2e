//! Subscription service module

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    communication::email_addresses::EmailAddress,
    subscriptions::{
        errors::{
            GetSubscriptionTypeError, ReconcileError, SubscriptionStoreError,
            SubscriptionWriteError,
        },
        ReconciliationReport, Subscription, SubscriptionChange, SubscriptionChoice,
        SubscriptionRepository, SubscriptionType,
    },
};

/// How many times a conflicting write is attempted for one subscription type
pub const MAX_RECONCILIATION_ATTEMPTS: usize = 3;

/// Subscription service
#[async_trait]
pub trait SubscriptionService: Clone + Send + Sync + 'static {
    /// Whether `email` currently receives mail of the given subscription type.
    ///
    /// # Returns
    /// The stored consent if a record exists, otherwise the type's default.
    async fn is_subscribed(
        &self,
        email: &EmailAddress,
        subscription_type_id: i64,
    ) -> Result<bool, GetSubscriptionTypeError>;

    /// Every subscription type paired with the current consent of `email`, ordered by type ID.
    async fn subscription_choices(
        &self,
        email: &EmailAddress,
    ) -> Result<Vec<SubscriptionChoice>, SubscriptionStoreError>;

    /// Apply a batch of desired consents for `email` with as few writes as possible.
    ///
    /// # Arguments
    /// * `email` - The recipient.
    /// * `desired` - Desired consent keyed by subscription type ID.
    ///
    /// # Returns
    /// A [`ReconciliationReport`] with one outcome per submitted type. A failure for one type
    /// does not prevent the others from being applied. [`Err`] only if the existing state
    /// could not be loaded.
    async fn reconcile(
        &self,
        email: &EmailAddress,
        desired: &BTreeMap<i64, bool>,
    ) -> Result<ReconciliationReport, SubscriptionStoreError>;
}

#[cfg(test)]
mock! {
    pub SubscriptionService {}

    impl Clone for SubscriptionService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl SubscriptionService for SubscriptionService {
        async fn is_subscribed(&self, email: &EmailAddress, subscription_type_id: i64) -> Result<bool, GetSubscriptionTypeError>;
        async fn subscription_choices(&self, email: &EmailAddress) -> Result<Vec<SubscriptionChoice>, SubscriptionStoreError>;
        async fn reconcile(&self, email: &EmailAddress, desired: &BTreeMap<i64, bool>) -> Result<ReconciliationReport, SubscriptionStoreError>;
    }
}

/// The write needed to bring one record to the desired consent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Write {
    Create,
    Update { previous: bool },
}

/// `None` when the current state already yields `desired`. An absent record that matches
/// the default stays absent; an existing record is updated even when it returns to the default.
fn required_write(
    subscription_type: &SubscriptionType,
    current: Option<&Subscription>,
    desired: bool,
) -> Option<Write> {
    match current {
        None if desired == subscription_type.subscribed_by_default => None,
        None => Some(Write::Create),
        Some(record) if record.subscribed == desired => None,
        Some(record) => Some(Write::Update {
            previous: record.subscribed,
        }),
    }
}

/// Subscription service implementation
#[derive(Debug, Clone)]
pub struct SubscriptionServiceImpl<R>
where
    R: SubscriptionRepository,
{
    repo: Arc<R>,
}

impl<R> SubscriptionServiceImpl<R>
where
    R: SubscriptionRepository,
{
    /// Create a new subscription service
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    async fn reconcile_one(
        &self,
        email: &EmailAddress,
        subscription_type: &SubscriptionType,
        mut current: Option<Subscription>,
        desired: bool,
    ) -> Result<SubscriptionChange, ReconcileError> {
        let mut attempt = 1;

        loop {
            let Some(write) = required_write(subscription_type, current.as_ref(), desired) else {
                return Ok(SubscriptionChange::Unchanged);
            };

            let subscription = Subscription {
                email: email.clone(),
                subscription_type_id: subscription_type.id,
                subscribed: desired,
            };

            let result = match write {
                Write::Create => self
                    .repo
                    .create_subscription(&subscription)
                    .await
                    .map(|()| SubscriptionChange::Created),
                Write::Update { previous } => self
                    .repo
                    .update_subscription(&subscription, previous)
                    .await
                    .map(|()| SubscriptionChange::Updated),
            };

            match result {
                Ok(change) => {
                    info!(
                        email = %email,
                        subscription_type_id = subscription_type.id,
                        subscribed = desired,
                        ?change,
                        "subscription reconciled"
                    );

                    return Ok(change);
                }
                Err(SubscriptionWriteError::Conflict) if attempt < MAX_RECONCILIATION_ATTEMPTS => {
                    debug!(
                        email = %email,
                        subscription_type_id = subscription_type.id,
                        attempt,
                        "subscription changed concurrently, reloading"
                    );

                    current = self
                        .repo
                        .get_subscription(email, subscription_type.id)
                        .await?;
                    attempt += 1;
                }
                Err(SubscriptionWriteError::Conflict) => {
                    return Err(ReconcileError::ReconciliationConflict {
                        subscription_type_id: subscription_type.id,
                        attempts: attempt,
                    });
                }
                Err(SubscriptionWriteError::UnknownError(e)) => {
                    return Err(ReconcileError::UnknownError(e));
                }
            }
        }
    }
}

#[async_trait]
impl<R> SubscriptionService for SubscriptionServiceImpl<R>
where
    R: SubscriptionRepository,
{
    async fn is_subscribed(
        &self,
        email: &EmailAddress,
        subscription_type_id: i64,
    ) -> Result<bool, GetSubscriptionTypeError> {
        let subscription_type = self.repo.get_subscription_type(subscription_type_id).await?;
        let record = self
            .repo
            .get_subscription(email, subscription_type_id)
            .await?;

        Ok(subscription_type.is_subscribed(record.as_ref()))
    }

    async fn subscription_choices(
        &self,
        email: &EmailAddress,
    ) -> Result<Vec<SubscriptionChoice>, SubscriptionStoreError> {
        let records: HashMap<i64, Subscription> = self
            .repo
            .list_subscriptions(email)
            .await?
            .into_iter()
            .map(|record| (record.subscription_type_id, record))
            .collect();

        let mut choices: Vec<SubscriptionChoice> = self
            .repo
            .list_subscription_types()
            .await?
            .into_iter()
            .map(|subscription_type| SubscriptionChoice {
                subscribed: subscription_type.is_subscribed(records.get(&subscription_type.id)),
                subscription_type,
            })
            .collect();

        choices.sort_by_key(|choice| choice.subscription_type.id);

        Ok(choices)
    }

    async fn reconcile(
        &self,
        email: &EmailAddress,
        desired: &BTreeMap<i64, bool>,
    ) -> Result<ReconciliationReport, SubscriptionStoreError> {
        let subscription_types: HashMap<i64, SubscriptionType> = self
            .repo
            .list_subscription_types()
            .await?
            .into_iter()
            .map(|subscription_type| (subscription_type.id, subscription_type))
            .collect();

        let mut existing: HashMap<i64, Subscription> = self
            .repo
            .list_subscriptions(email)
            .await?
            .into_iter()
            .map(|record| (record.subscription_type_id, record))
            .collect();

        let mut report = ReconciliationReport::default();

        for (&subscription_type_id, &subscribed) in desired {
            let outcome = match subscription_types.get(&subscription_type_id) {
                Some(subscription_type) => {
                    let current = existing.remove(&subscription_type_id);

                    self.reconcile_one(email, subscription_type, current, subscribed)
                        .await
                }
                None => Err(ReconcileError::UnknownSubscriptionType(subscription_type_id)),
            };

            if let Err(err) = &outcome {
                warn!(
                    email = %email,
                    subscription_type_id,
                    error = %err,
                    "could not reconcile subscription"
                );
            }

            report.record(subscription_type_id, outcome);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use mockall::{predicate::eq, Sequence};
    use testresult::TestResult;

    use crate::domain::subscriptions::tests::MockSubscriptionRepository;

    use super::*;

    fn email() -> EmailAddress {
        EmailAddress::new_unchecked("a@x.com")
    }

    fn newsletter() -> SubscriptionType {
        SubscriptionType {
            id: 1,
            name: "Newsletter".to_string(),
            subscribed_by_default: true,
            description: "Monthly news".to_string(),
        }
    }

    fn offers() -> SubscriptionType {
        SubscriptionType {
            id: 2,
            name: "Partner offers".to_string(),
            subscribed_by_default: false,
            description: String::new(),
        }
    }

    fn record(subscription_type_id: i64, subscribed: bool) -> Subscription {
        Subscription {
            email: email(),
            subscription_type_id,
            subscribed,
        }
    }

    fn repo_with(records: Vec<Subscription>) -> MockSubscriptionRepository {
        let mut repo = MockSubscriptionRepository::new();

        repo.expect_list_subscription_types()
            .times(1)
            .returning(|| Ok(vec![newsletter(), offers()]));

        repo.expect_list_subscriptions()
            .times(1)
            .returning(move |_| Ok(records.clone()));

        repo
    }

    #[test]
    fn test_required_write() {
        let newsletter = newsletter();

        assert_eq!(required_write(&newsletter, None, true), None);
        assert_eq!(required_write(&newsletter, None, false), Some(Write::Create));
        assert_eq!(
            required_write(&newsletter, Some(&record(1, false)), false),
            None
        );
        assert_eq!(
            required_write(&newsletter, Some(&record(1, false)), true),
            Some(Write::Update { previous: false })
        );
    }

    #[tokio::test]
    async fn test_is_subscribed_without_record_uses_default() -> TestResult {
        let mut repo = MockSubscriptionRepository::new();

        repo.expect_get_subscription_type()
            .with(eq(1))
            .returning(|_| Ok(newsletter()));
        repo.expect_get_subscription().returning(|_, _| Ok(None));

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        assert!(service.is_subscribed(&email(), 1).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_is_subscribed_with_record_uses_record() -> TestResult {
        let mut repo = MockSubscriptionRepository::new();

        repo.expect_get_subscription_type()
            .returning(|_| Ok(newsletter()));
        repo.expect_get_subscription()
            .returning(|_, _| Ok(Some(record(1, false))));

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        assert!(!service.is_subscribed(&email(), 1).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_is_subscribed_unknown_type() {
        let mut repo = MockSubscriptionRepository::new();

        repo.expect_get_subscription_type()
            .returning(|id| Err(GetSubscriptionTypeError::SubscriptionTypeNotFound(id)));
        repo.expect_get_subscription().times(0);

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let result = service.is_subscribed(&email(), 99).await;

        assert!(matches!(
            result,
            Err(GetSubscriptionTypeError::SubscriptionTypeNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_subscription_choices() -> TestResult {
        let repo = repo_with(vec![record(1, false)]);
        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let choices = service.subscription_choices(&email()).await?;

        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].subscription_type.name, "Newsletter");
        assert!(!choices[0].subscribed);
        assert_eq!(choices[1].subscription_type.name, "Partner offers");
        assert!(!choices[1].subscribed);

        Ok(())
    }

    #[tokio::test]
    async fn test_desired_default_without_record_writes_nothing() -> TestResult {
        let mut repo = repo_with(vec![]);

        repo.expect_create_subscription().times(0);
        repo.expect_update_subscription().times(0);

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(1, true), (2, false)]))
            .await?;

        assert_eq!(report.writes(), 0);
        assert!(matches!(
            report.outcome(1),
            Some(Ok(SubscriptionChange::Unchanged))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_non_default_without_record_creates_one_record() -> TestResult {
        let mut repo = repo_with(vec![]);

        repo.expect_create_subscription()
            .times(1)
            .withf(|subscription| {
                subscription.subscription_type_id == 1
                    && !subscription.subscribed
                    && subscription.email.as_str() == "a@x.com"
            })
            .returning(|_| Ok(()));
        repo.expect_update_subscription().times(0);

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(1, false)]))
            .await?;

        assert_eq!(report.writes(), 1);
        assert!(matches!(
            report.outcome(1),
            Some(Ok(SubscriptionChange::Created))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_existing_record_is_updated_back_to_default() -> TestResult {
        let mut repo = repo_with(vec![record(1, false)]);

        repo.expect_create_subscription().times(0);
        repo.expect_update_subscription()
            .times(1)
            .withf(|subscription, previous| subscription.subscribed && !*previous)
            .returning(|_, _| Ok(()));

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(1, true)]))
            .await?;

        assert!(matches!(
            report.outcome(1),
            Some(Ok(SubscriptionChange::Updated))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_matching_record_writes_nothing() -> TestResult {
        let mut repo = repo_with(vec![record(1, false), record(2, true)]);

        repo.expect_create_subscription().times(0);
        repo.expect_update_subscription().times(0);

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(1, false), (2, true)]))
            .await?;

        assert_eq!(report.writes(), 0);
        assert!(report.is_success());

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_type_does_not_block_others() -> TestResult {
        let mut repo = repo_with(vec![]);

        repo.expect_create_subscription()
            .times(1)
            .returning(|_| Ok(()));

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(2, true), (42, true)]))
            .await?;

        assert!(matches!(
            report.outcome(2),
            Some(Ok(SubscriptionChange::Created))
        ));
        assert!(matches!(
            report.outcome(42),
            Some(Err(ReconcileError::UnknownSubscriptionType(42)))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_write_failure_does_not_block_others() -> TestResult {
        let mut repo = repo_with(vec![]);

        repo.expect_create_subscription()
            .times(2)
            .returning(|subscription| match subscription.subscription_type_id {
                1 => Err(SubscriptionWriteError::UnknownError(anyhow!("disk full"))),
                _ => Ok(()),
            });

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(1, false), (2, true)]))
            .await?;

        assert!(matches!(
            report.outcome(1),
            Some(Err(ReconcileError::UnknownError(_)))
        ));
        assert!(matches!(
            report.outcome(2),
            Some(Ok(SubscriptionChange::Created))
        ));
        assert_eq!(report.writes(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_is_retried_against_fresh_record() -> TestResult {
        let mut repo = repo_with(vec![]);
        let mut seq = Sequence::new();

        repo.expect_create_subscription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(SubscriptionWriteError::Conflict));
        repo.expect_get_subscription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Some(record(2, false))));
        repo.expect_update_subscription()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|subscription, previous| subscription.subscribed && !*previous)
            .returning(|_, _| Ok(()));

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(2, true)]))
            .await?;

        assert!(matches!(
            report.outcome(2),
            Some(Ok(SubscriptionChange::Updated))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_conflict_resolved_by_concurrent_writer() -> TestResult {
        let mut repo = repo_with(vec![]);

        repo.expect_create_subscription()
            .times(1)
            .returning(|_| Err(SubscriptionWriteError::Conflict));
        repo.expect_get_subscription()
            .times(1)
            .returning(|_, _| Ok(Some(record(2, true))));
        repo.expect_update_subscription().times(0);

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(2, true)]))
            .await?;

        assert!(matches!(
            report.outcome(2),
            Some(Ok(SubscriptionChange::Unchanged))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_conflict_is_bounded() -> TestResult {
        let mut repo = repo_with(vec![record(1, true)]);

        repo.expect_update_subscription()
            .times(MAX_RECONCILIATION_ATTEMPTS)
            .returning(|_, _| Err(SubscriptionWriteError::Conflict));
        repo.expect_get_subscription()
            .times(MAX_RECONCILIATION_ATTEMPTS - 1)
            .returning(|_, _| Ok(Some(record(1, true))));

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let report = service
            .reconcile(&email(), &BTreeMap::from([(1, false)]))
            .await?;

        assert!(matches!(
            report.outcome(1),
            Some(Err(ReconcileError::ReconciliationConflict {
                subscription_type_id: 1,
                attempts: MAX_RECONCILIATION_ATTEMPTS,
            }))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_load_failure_aborts_batch() {
        let mut repo = MockSubscriptionRepository::new();

        repo.expect_list_subscription_types()
            .returning(|| Err(SubscriptionStoreError::UnknownError(anyhow!("offline"))));
        repo.expect_create_subscription().times(0);

        let service = SubscriptionServiceImpl::new(Arc::new(repo));

        let result = service
            .reconcile(&email(), &BTreeMap::from([(1, false)]))
            .await;

        assert!(result.is_err());
    }
}
