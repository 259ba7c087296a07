//! Restore driver: plan, fetch, verify and write files back to disk.

use super::call;
use crate::config::BusConfig;
use crate::fs::relative_key_to_path;
use crate::protocol::restore::{
    FileRestoreArgs, FileRestoreResponse, InstanceSummary, ListInstancesArgs, ListInstancesResponse,
    RestorePlanArgs, RestorePlanResponse, RestoreRequest, SourceMedium,
};
use crate::protocol::{decode_content, FileDescriptor};
use crate::utils::errors::{ClientError, Result};
use crate::utils::hash::verify_sha256;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RestorePlan {
    pub instance_structure: String,
    pub files: Vec<FileDescriptor>,
    pub message: Option<String>,
}

/// Verified content of one restored file.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub relative_path: String,
    pub content: Vec<u8>,
    pub source: SourceMedium,
    pub hash: String,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<(String, SourceMedium)>,
    pub failed: Vec<(String, String)>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct RestoreClient {
    bus: BusConfig,
    service: String,
}

impl RestoreClient {
    pub fn new(bus: BusConfig, service: impl Into<String>) -> Self {
        Self {
            bus,
            service: service.into(),
        }
    }

    pub async fn plan(&self, instance_id: i64) -> Result<RestorePlan> {
        let request = RestoreRequest::GetRestorePlan(RestorePlanArgs { instance_id });
        match call(&self.bus, &self.service, &request).await? {
            RestorePlanResponse::Plan {
                instance_structure,
                files,
                message,
            } => Ok(RestorePlan {
                instance_structure,
                files,
                message,
            }),
            RestorePlanResponse::Failed { message } => Err(ClientError::Rejected(message)),
        }
    }

    pub async fn list_instances(&self, limit: Option<u32>) -> Result<Vec<InstanceSummary>> {
        let request = RestoreRequest::ListInstances(ListInstancesArgs { limit });
        match call(&self.bus, &self.service, &request).await? {
            ListInstancesResponse::Instances { instances } => Ok(instances),
            ListInstancesResponse::Failed { message } => Err(ClientError::Rejected(message)),
        }
    }

    /// Fetch one file and check it against the hash the resolver reports.
    ///
    /// The resolver already verifies content; the check here also covers
    /// corruption between the resolver and this process.
    pub async fn fetch_file(&self, instance_id: i64, relative_path: &str) -> Result<FetchedFile> {
        let request = RestoreRequest::RequestFileRestore(FileRestoreArgs {
            instance_id,
            relative_path: relative_path.to_string(),
        });
        match call(&self.bus, &self.service, &request).await? {
            FileRestoreResponse::Restored {
                relative_path,
                content_b64,
                source_medium,
                original_hash,
            } => {
                let content = decode_content(&content_b64)?;
                if !verify_sha256(&content, &original_hash) {
                    return Err(ClientError::Integrity(format!(
                        "'{}' from {} does not match hash {}",
                        relative_path, source_medium, original_hash
                    )));
                }
                Ok(FetchedFile {
                    relative_path,
                    content,
                    source: source_medium,
                    hash: original_hash,
                })
            }
            FileRestoreResponse::Unavailable { message, .. } => Err(ClientError::Rejected(message)),
            FileRestoreResponse::Failed { message } => Err(ClientError::Rejected(message)),
        }
    }

    /// Restore every file of `instance_id` below `destination`.
    ///
    /// Files that cannot be restored are collected in the report rather than
    /// stopping the run.
    pub async fn restore_instance(&self, instance_id: i64, destination: &Path) -> Result<RestoreReport> {
        let plan = self.plan(instance_id).await?;
        if let Some(message) = &plan.message {
            info!("{}", message);
        }
        info!(
            "Restoring instance {} ('{}', {} files) into {}",
            instance_id,
            plan.instance_structure,
            plan.files.len(),
            destination.display()
        );

        let mut report = RestoreReport::default();
        for descriptor in &plan.files {
            match self.restore_one(instance_id, descriptor, destination).await {
                Ok(source) => {
                    info!("Restored {} from {}", descriptor.relative_path, source);
                    report.restored.push((descriptor.relative_path.clone(), source));
                }
                Err(e) => {
                    warn!("Could not restore {}: {}", descriptor.relative_path, e);
                    report.failed.push((descriptor.relative_path.clone(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    async fn restore_one(
        &self,
        instance_id: i64,
        descriptor: &FileDescriptor,
        destination: &Path,
    ) -> Result<SourceMedium> {
        let target = destination_path(destination, &descriptor.relative_path)?;
        let fetched = self.fetch_file(instance_id, &descriptor.relative_path).await?;
        if !fetched.hash.eq_ignore_ascii_case(&descriptor.hash) {
            return Err(ClientError::Integrity(format!(
                "'{}' was restored with hash {} but the plan lists {}",
                descriptor.relative_path, fetched.hash, descriptor.hash
            )));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &fetched.content).await?;
        Ok(fetched.source)
    }
}

fn destination_path(destination: &Path, relative_path: &str) -> Result<PathBuf> {
    Ok(destination.join(relative_key_to_path(relative_path)?))
}
