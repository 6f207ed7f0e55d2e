//! Domain layer: models, ports and services

pub mod attachments;
pub mod communication;
pub mod mailing;
pub mod subscriptions;
