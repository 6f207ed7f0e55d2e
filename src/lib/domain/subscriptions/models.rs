//! Subscription models

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::communication::email_addresses::EmailAddress;

use super::errors::ReconcileError;

/// A kind of mail recipients can opt in or out of
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionType {
    /// Subscription type ID
    pub id: i64,

    /// Name shown to recipients
    pub name: String,

    /// Consent assumed for recipients without an explicit record
    pub subscribed_by_default: bool,

    /// Description shown to recipients
    pub description: String,
}

impl SubscriptionType {
    /// Whether a recipient with `record` (or no record) is subscribed to this type
    pub fn is_subscribed(&self, record: Option<&Subscription>) -> bool {
        record.map_or(self.subscribed_by_default, |record| record.subscribed)
    }
}

/// An explicit consent record for one recipient and one subscription type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    /// Recipient
    pub email: EmailAddress,

    /// Subscription type ID
    pub subscription_type_id: i64,

    /// Whether the recipient is subscribed
    pub subscribed: bool,
}

/// One subscription type with the recipient's current consent, as shown in a consent form
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionChoice {
    /// The subscription type
    pub subscription_type: SubscriptionType,

    /// Current consent, explicit or default
    pub subscribed: bool,
}

/// What reconciliation did to one subscription type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SubscriptionChange {
    /// Nothing was written
    Unchanged,

    /// A record was created
    Created,

    /// An existing record was updated
    Updated,
}

/// Per-type outcome of a reconciliation
#[derive(Debug, Default)]
pub struct ReconciliationReport {
    outcomes: BTreeMap<i64, Result<SubscriptionChange, ReconcileError>>,
}

impl ReconciliationReport {
    /// Record the outcome for `subscription_type_id`
    pub fn record(
        &mut self,
        subscription_type_id: i64,
        outcome: Result<SubscriptionChange, ReconcileError>,
    ) {
        self.outcomes.insert(subscription_type_id, outcome);
    }

    /// The outcome for one subscription type, if it was submitted
    pub fn outcome(
        &self,
        subscription_type_id: i64,
    ) -> Option<&Result<SubscriptionChange, ReconcileError>> {
        self.outcomes.get(&subscription_type_id)
    }

    /// Every outcome, ordered by subscription type ID
    pub fn outcomes(&self) -> impl Iterator<Item = (i64, &Result<SubscriptionChange, ReconcileError>)> {
        self.outcomes.iter().map(|(id, outcome)| (*id, outcome))
    }

    /// Number of records created or updated
    pub fn writes(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| {
                matches!(
                    outcome,
                    Ok(SubscriptionChange::Created | SubscriptionChange::Updated)
                )
            })
            .count()
    }

    /// The subscription types that could not be reconciled
    pub fn failures(&self) -> impl Iterator<Item = (i64, &ReconcileError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| outcome.as_ref().err().map(|err| (*id, err)))
    }

    /// Whether every submitted type was reconciled
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}
