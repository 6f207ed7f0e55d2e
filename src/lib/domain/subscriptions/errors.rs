//! Error types for the subscription ledger

use anyhow::anyhow;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when reading the ledger
#[derive(Debug, Error)]
pub enum SubscriptionStoreError {
    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when getting a subscription type
#[derive(Debug, Error)]
pub enum GetSubscriptionTypeError {
    /// Subscription type not found
    #[error("subscription type with id \"{0}\" not found")]
    SubscriptionTypeNotFound(i64),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when writing a subscription record
#[derive(Debug, Error)]
pub enum SubscriptionWriteError {
    /// The record changed between the read and the write
    #[error("subscription record was modified concurrently")]
    Conflict,

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when reconciling one subscription type
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The submitted subscription type does not exist
    #[error("subscription type with id \"{0}\" does not exist")]
    UnknownSubscriptionType(i64),

    /// The record kept changing under concurrent writes
    #[error("subscription type \"{subscription_type_id}\" still conflicted after {attempts} attempts")]
    ReconciliationConflict {
        /// The affected subscription type
        subscription_type_id: i64,

        /// How many writes were attempted
        attempts: usize,
    },

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl From<SubscriptionStoreError> for GetSubscriptionTypeError {
    fn from(err: SubscriptionStoreError) -> Self {
        debug!("SubscriptionStoreError -> GetSubscriptionTypeError");

        match err {
            SubscriptionStoreError::UnknownError(e) => GetSubscriptionTypeError::UnknownError(e),
        }
    }
}

impl From<SubscriptionStoreError> for ReconcileError {
    fn from(err: SubscriptionStoreError) -> Self {
        debug!("SubscriptionStoreError -> ReconcileError");

        match err {
            SubscriptionStoreError::UnknownError(e) => ReconcileError::UnknownError(e),
        }
    }
}

impl From<sqlx::Error> for SubscriptionStoreError {
    fn from(err: sqlx::Error) -> Self {
        SubscriptionStoreError::UnknownError(anyhow!("Unknown database error: {:?}", err))
    }
}

impl From<sqlx::Error> for GetSubscriptionTypeError {
    fn from(err: sqlx::Error) -> Self {
        GetSubscriptionTypeError::UnknownError(anyhow!("Unknown database error: {:?}", err))
    }
}

impl From<sqlx::Error> for SubscriptionWriteError {
    fn from(err: sqlx::Error) -> Self {
        debug!("sqlxError: {:?}", err);

        match err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation => SubscriptionWriteError::Conflict,
                _ => SubscriptionWriteError::UnknownError(anyhow!(
                    "Unknown database error: {:?}",
                    db_err
                )),
            },
            _ => SubscriptionWriteError::UnknownError(anyhow!("Unknown database error: {:?}", err)),
        }
    }
}
