//! Repository adapters

pub mod memory;
pub mod postgres;
