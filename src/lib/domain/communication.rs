//! Communication module

pub mod email_addresses;
