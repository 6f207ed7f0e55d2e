//! Subscription ledger.
//!
//! Consent is recorded per (email, subscription type). A missing record means the type's
//! default applies, so records are only written when a recipient departs from it.

mod models;
mod repository;
mod service;

pub mod errors;

pub use models::{
    ReconciliationReport, Subscription, SubscriptionChange, SubscriptionChoice, SubscriptionType,
};
pub use repository::SubscriptionRepository;
pub use service::{SubscriptionService, SubscriptionServiceImpl, MAX_RECONCILIATION_ATTEMPTS};
