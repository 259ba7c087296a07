//! Backup platform services
//!
//! The backup transaction coordinator and the restore cascade resolver,
//! together with the storage tiers and the SQLite catalog they share.

pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod models;
pub mod restore;
pub mod services;
pub mod storage;
pub mod store;

pub use config::AppConfig;
pub use coordinator::{BackupService, Coordinator};
pub use error::ServiceError;
pub use restore::{Resolver, RestoreService};
