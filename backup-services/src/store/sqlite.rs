use super::{MetadataStore, NewInstance};
use crate::db::connection::DbPool;
use crate::models::backed_up_file;
use crate::models::backup_instance::{self, BackupInstance, CreateInstanceData};
use async_trait::async_trait;
use backup_bus::protocol::FileDescriptor;

pub struct SqliteMetadataStore {
    db: DbPool,
}

impl SqliteMetadataStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_instance_and_files(&self, instance: NewInstance) -> anyhow::Result<i64> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.get()?;
            let tx = conn.transaction()?;
            let id = backup_instance::create(
                &tx,
                &CreateInstanceData {
                    structure: &instance.structure,
                    total_size: instance.total_size as i64,
                    auto_job_id: instance.auto_job_id,
                },
            )?;
            for file in &instance.files {
                backed_up_file::create(&tx, id, file)?;
            }
            tx.commit()?;
            tracing::debug!("[DB] Instance {} recorded with {} file(s)", id, instance.files.len());
            Ok::<_, anyhow::Error>(id)
        })
        .await?
    }

    async fn get_instance(&self, id: i64) -> anyhow::Result<Option<BackupInstance>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            backup_instance::find_by_id(&conn, id)
        })
        .await?
    }

    async fn list_files(
        &self,
        instance_id: i64,
        path_filter: Option<&str>,
    ) -> anyhow::Result<Vec<FileDescriptor>> {
        let db = self.db.clone();
        let path_filter = path_filter.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            let files = backed_up_file::find_by_instance(&conn, instance_id, path_filter.as_deref())?;
            Ok::<_, anyhow::Error>(files.into_iter().map(FileDescriptor::from).collect())
        })
        .await?
    }

    async fn list_instances(&self, limit: u32) -> anyhow::Result<Vec<BackupInstance>> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            backup_instance::find_recent(&conn, limit)
        })
        .await?
    }
}
