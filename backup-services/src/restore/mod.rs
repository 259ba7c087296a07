//! Restore cascade resolver.
//!
//! Each file is looked up in the catalog and then read from the configured
//! sources in order. The first copy whose size and SHA-256 match the catalog
//! wins; corrupt copies are skipped exactly like missing ones.

pub mod service;
pub mod source;

pub use service::RestoreService;
pub use source::{RestoreSource, SourceFailure};

use crate::error::ServiceError;
use crate::models::backup_instance::BackupInstance;
use crate::store::MetadataStore;
use backup_bus::protocol::restore::SourceMedium;
use backup_bus::protocol::FileDescriptor;
use backup_bus::utils::hash::verify_sha256;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlan {
    pub structure: String,
    pub files: Vec<FileDescriptor>,
}

#[derive(Debug, Clone)]
pub struct RestoredFile {
    pub content: Vec<u8>,
    pub source: SourceMedium,
    pub hash: String,
}

#[derive(thiserror::Error, Debug)]
pub enum RestoreError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Every source failed; carries the last one tried.
    #[error("all sources failed, last was {medium}: {failure}")]
    Exhausted {
        medium: SourceMedium,
        failure: SourceFailure,
    },
}

pub struct Resolver {
    store: Arc<dyn MetadataStore>,
    sources: Vec<Arc<dyn RestoreSource>>,
}

impl Resolver {
    /// `sources` are tried in the given order.
    pub fn new(store: Arc<dyn MetadataStore>, sources: Vec<Arc<dyn RestoreSource>>) -> Self {
        Self { store, sources }
    }

    async fn instance(&self, instance_id: i64) -> Result<BackupInstance, ServiceError> {
        self.store
            .get_instance(instance_id)
            .await
            .map_err(|e| ServiceError::Backend(format!("catalog read failed: {}", e)))?
            .ok_or_else(|| ServiceError::NotFound(format!("instance {} not found", instance_id)))
    }

    pub async fn get_restore_plan(&self, instance_id: i64) -> Result<RestorePlan, ServiceError> {
        let instance = self.instance(instance_id).await?;
        let files = self
            .store
            .list_files(instance_id, None)
            .await
            .map_err(|e| ServiceError::Backend(format!("catalog read failed: {}", e)))?;
        Ok(RestorePlan {
            structure: instance.structure,
            files,
        })
    }

    pub async fn list_instances(&self, limit: u32) -> Result<Vec<BackupInstance>, ServiceError> {
        self.store
            .list_instances(limit)
            .await
            .map_err(|e| ServiceError::Backend(format!("catalog read failed: {}", e)))
    }

    /// Return the first verified copy of `relative_path`.
    pub async fn restore_file(
        &self,
        instance_id: i64,
        relative_path: &str,
    ) -> Result<RestoredFile, RestoreError> {
        let instance = self.instance(instance_id).await?;
        let expected = self
            .store
            .list_files(instance_id, Some(relative_path))
            .await
            .map_err(|e| ServiceError::Backend(format!("catalog read failed: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "'{}' is not part of instance {}",
                    relative_path, instance_id
                ))
            })?;

        let mut last = None;
        for source in &self.sources {
            let medium = source.medium();
            let attempt = source
                .read(&instance.structure, relative_path)
                .await
                .and_then(|content| verify(content, &expected));
            match attempt {
                Ok(content) => {
                    info!("Restored '{}' of instance {} from {}", relative_path, instance_id, medium);
                    return Ok(RestoredFile {
                        content,
                        source: medium,
                        hash: expected.hash,
                    });
                }
                Err(failure) => {
                    warn!("Restore of '{}' from {} failed: {}", relative_path, medium, failure);
                    last = Some((medium, failure));
                }
            }
        }

        match last {
            Some((medium, failure)) => Err(RestoreError::Exhausted { medium, failure }),
            None => Err(ServiceError::Backend("no restore sources configured".into()).into()),
        }
    }
}

fn verify(content: Vec<u8>, expected: &FileDescriptor) -> Result<Vec<u8>, SourceFailure> {
    if content.len() as u64 != expected.size {
        return Err(SourceFailure::IntegrityError(format!(
            "size mismatch: expected {} bytes, found {}",
            expected.size,
            content.len()
        )));
    }
    if !verify_sha256(&content, &expected.hash) {
        return Err(SourceFailure::IntegrityError("hash mismatch".into()));
    }
    Ok(content)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::cloud::memory::MemoryCloud;
    use crate::storage::{CloudSource, LocalTier};
    use crate::store::sqlite::tests::open_store;
    use crate::store::{NewInstance, SqliteMetadataStore};
    use backup_bus::utils::hash::sha256_hex;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    pub(crate) struct Fixture {
        pub _dir: TempDir,
        pub resolver: Resolver,
        pub store: Arc<SqliteMetadataStore>,
        pub cloud: Arc<MemoryCloud>,
        pub primary: PathBuf,
        pub secondary: PathBuf,
        pub instance_id: i64,
    }

    impl Fixture {
        pub fn write_local(&self, root: &Path, relative_path: &str, content: &[u8]) {
            let path = root.join("docs").join(relative_path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        pub fn put_everywhere(&self, relative_path: &str, content: &[u8]) {
            self.write_local(&self.primary, relative_path, content);
            self.write_local(&self.secondary, relative_path, content);
            self.cloud.put(&format!("docs/{}", relative_path), content);
        }
    }

    /// Instance "docs" cataloguing `a.txt` = "hello"; no copies written yet.
    pub(crate) async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("local_copy");
        let secondary = dir.path().join("secondary_copy");
        let store = Arc::new(open_store(&dir));
        let cloud = Arc::new(MemoryCloud::new());

        let instance_id = store
            .insert_instance_and_files(NewInstance {
                structure: "docs".into(),
                total_size: 5,
                files: vec![FileDescriptor {
                    relative_path: "a.txt".into(),
                    hash: sha256_hex(b"hello"),
                    size: 5,
                }],
                auto_job_id: None,
            })
            .await
            .unwrap();

        let resolver = Resolver::new(
            store.clone(),
            vec![
                Arc::new(LocalTier::primary(&primary)),
                Arc::new(LocalTier::secondary(&secondary)),
                Arc::new(CloudSource::new(cloud.clone())),
            ],
        );

        Fixture {
            _dir: dir,
            resolver,
            store,
            cloud,
            primary,
            secondary,
            instance_id,
        }
    }

    #[tokio::test]
    async fn test_primary_wins_when_intact() {
        let f = fixture().await;
        f.put_everywhere("a.txt", b"hello");

        let restored = f.resolver.restore_file(f.instance_id, "a.txt").await.unwrap();
        assert_eq!(restored.content, b"hello");
        assert_eq!(restored.source, SourceMedium::LocalPrimary);
        assert_eq!(restored.hash, sha256_hex(b"hello"));
    }

    #[tokio::test]
    async fn test_corrupt_primary_falls_back_to_secondary() {
        let f = fixture().await;
        f.put_everywhere("a.txt", b"hello");
        // Same size, different bytes: only the hash check can catch it
        f.write_local(&f.primary, "a.txt", b"jello");

        let restored = f.resolver.restore_file(f.instance_id, "a.txt").await.unwrap();
        assert_eq!(restored.content, b"hello");
        assert_eq!(restored.source, SourceMedium::LocalSecondary);
    }

    #[tokio::test]
    async fn test_missing_locals_fall_back_to_cloud() {
        let f = fixture().await;
        f.cloud.put("docs/a.txt", b"hello");

        let restored = f.resolver.restore_file(f.instance_id, "a.txt").await.unwrap();
        assert_eq!(restored.source, SourceMedium::Cloud);
        assert_eq!(restored.content, b"hello");
    }

    #[tokio::test]
    async fn test_all_sources_bad_reports_last_failure() {
        let f = fixture().await;
        f.write_local(&f.primary, "a.txt", b"truncated");
        f.cloud.put("docs/a.txt", b"hellO");

        let err = f.resolver.restore_file(f.instance_id, "a.txt").await.unwrap_err();
        match err {
            RestoreError::Exhausted { medium, failure } => {
                assert_eq!(medium, SourceMedium::Cloud);
                assert_eq!(failure, SourceFailure::IntegrityError("hash mismatch".into()));
            }
            other => panic!("expected exhausted cascade, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_instance_and_path_are_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.resolver.restore_file(f.instance_id + 1, "a.txt").await,
            Err(RestoreError::Service(ServiceError::NotFound(_)))
        ));
        assert!(matches!(
            f.resolver.restore_file(f.instance_id, "b.txt").await,
            Err(RestoreError::Service(ServiceError::NotFound(_)))
        ));
        assert!(matches!(
            f.resolver.get_restore_plan(f.instance_id + 1).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_plan_lists_catalog_files() {
        let f = fixture().await;
        let plan = f.resolver.get_restore_plan(f.instance_id).await.unwrap();
        assert_eq!(plan.structure, "docs");
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.files[0].relative_path, "a.txt");

        let empty_id = f
            .store
            .insert_instance_and_files(NewInstance {
                structure: "empty".into(),
                total_size: 0,
                files: vec![],
                auto_job_id: None,
            })
            .await
            .unwrap();
        assert!(f.resolver.get_restore_plan(empty_id).await.unwrap().files.is_empty());
    }

    #[test]
    fn test_verify_checks_size_before_hash() {
        let expected = FileDescriptor {
            relative_path: "a.txt".into(),
            hash: sha256_hex(b"hello"),
            size: 5,
        };
        assert!(verify(b"hello".to_vec(), &expected).is_ok());
        assert!(matches!(
            verify(b"hello!".to_vec(), &expected),
            Err(SourceFailure::IntegrityError(msg)) if msg.starts_with("size mismatch")
        ));
    }
}
