//! Infrastructure layer: configuration, databases and file storage

pub mod config;
pub mod db;
pub mod storage;
