//! Catalog of committed backup instances.

pub mod sqlite;

pub use sqlite::SqliteMetadataStore;

use crate::models::backup_instance::BackupInstance;
use async_trait::async_trait;
use backup_bus::protocol::FileDescriptor;

/// Everything written for one committed backup.
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub structure: String,
    pub total_size: u64,
    pub files: Vec<FileDescriptor>,
    pub auto_job_id: Option<i64>,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Write the instance row and all its file rows atomically; returns the
    /// new instance id.
    async fn insert_instance_and_files(&self, instance: NewInstance) -> anyhow::Result<i64>;

    async fn get_instance(&self, id: i64) -> anyhow::Result<Option<BackupInstance>>;

    /// Files ordered by relative path; `path_filter` selects a single path.
    async fn list_files(
        &self,
        instance_id: i64,
        path_filter: Option<&str>,
    ) -> anyhow::Result<Vec<FileDescriptor>>;

    /// Newest first.
    async fn list_instances(&self, limit: u32) -> anyhow::Result<Vec<BackupInstance>>;
}
