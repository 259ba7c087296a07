//! Drives one backup transaction against the coordinator.

use super::call;
use crate::config::BusConfig;
use crate::fs::walker::{scan_source, WalkOptions};
use crate::protocol::backup::{
    BackupRequest, BeginBackupArgs, BeginBackupResponse, EndBackupArgs, EndBackupResponse,
    FileToBackup, UploadFileArgs, UploadFileResponse,
};
use crate::protocol::encode_content;
use crate::utils::errors::{ClientError, Result};
use std::path::Path;
use tracing::{info, warn};

/// Outcome of a committed backup.
#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub instance_id: i64,
    pub files: usize,
    pub bytes: u64,
    pub message: String,
}

pub struct BackupClient {
    bus: BusConfig,
    service: String,
    walk: WalkOptions,
}

impl BackupClient {
    pub fn new(bus: BusConfig, service: impl Into<String>) -> Self {
        Self {
            bus,
            service: service.into(),
            walk: WalkOptions::default(),
        }
    }

    /// Control how `backup_directory` scans its source.
    pub fn with_walk_options(mut self, walk: WalkOptions) -> Self {
        self.walk = walk;
        self
    }

    /// Open a transaction expecting exactly `relative_paths`.
    pub async fn begin(
        &self,
        structure: &str,
        relative_paths: &[String],
        auto_job_id: Option<i64>,
    ) -> Result<String> {
        let request = BackupRequest::BeginBackup(BeginBackupArgs {
            structure: structure.to_string(),
            files_to_backup: relative_paths
                .iter()
                .map(|p| FileToBackup {
                    relative_path: p.clone(),
                })
                .collect(),
            auto_job_id,
        });
        match call(&self.bus, &self.service, &request).await? {
            BeginBackupResponse::Started { transaction_id } => Ok(transaction_id),
            BeginBackupResponse::Failed { message } => Err(ClientError::Rejected(message)),
        }
    }

    pub async fn upload(&self, transaction_id: &str, relative_path: &str, content: &[u8]) -> Result<()> {
        let request = BackupRequest::UploadFile(UploadFileArgs {
            transaction_id: transaction_id.to_string(),
            relative_path: relative_path.to_string(),
            content_b64: encode_content(content),
        });
        match call(&self.bus, &self.service, &request).await? {
            UploadFileResponse::Processed { .. } => Ok(()),
            UploadFileResponse::Failed { message } => Err(ClientError::Rejected(message)),
        }
    }

    /// Commit (or, with `abort`, roll back) the transaction.
    pub async fn end(&self, transaction_id: &str, abort: bool) -> Result<(i64, usize, String)> {
        let request = BackupRequest::EndBackup(EndBackupArgs {
            transaction_id: transaction_id.to_string(),
            abort,
        });
        match call(&self.bus, &self.service, &request).await? {
            EndBackupResponse::Committed {
                message,
                instance_id,
                files_committed,
            } => Ok((instance_id, files_committed, message)),
            EndBackupResponse::Failed { message } => Err(ClientError::Rejected(message)),
        }
    }

    /// Back up every regular file under `source` into `structure`.
    ///
    /// Any failure after `begin_backup` aborts the transaction so nothing is
    /// left behind on the storage tiers.
    pub async fn backup_directory(
        &self,
        source: &Path,
        structure: &str,
        auto_job_id: Option<i64>,
    ) -> Result<BackupSummary> {
        let files = scan_source(source, &self.walk)?;
        let relative_paths: Vec<String> = files.iter().map(|f| f.relative_path.clone()).collect();
        let total_bytes: u64 = files.iter().map(|f| f.size).sum();

        info!(
            "Backing up {} ({} files, {} bytes) into '{}'",
            source.display(),
            files.len(),
            total_bytes,
            structure
        );

        let transaction_id = self.begin(structure, &relative_paths, auto_job_id).await?;

        for file in &files {
            let uploaded = match tokio::fs::read(&file.path).await {
                Ok(content) => self.upload(&transaction_id, &file.relative_path, &content).await,
                Err(e) => Err(ClientError::Io(e)),
            };
            if let Err(e) = uploaded {
                warn!("Upload of '{}' failed: {}; aborting backup", file.relative_path, e);
                // The coordinator answers an abort with a rolled back failure
                match self.end(&transaction_id, true).await {
                    Err(ClientError::Rejected(message)) => info!("Backup aborted: {}", message),
                    Err(abort_err) => warn!("Abort of transaction {} failed: {}", transaction_id, abort_err),
                    Ok(_) => {}
                }
                return Err(e);
            }
            info!("Uploaded {} ({} bytes)", file.relative_path, file.size);
        }

        let (instance_id, files_committed, message) = self.end(&transaction_id, false).await?;
        info!("Backup committed as instance {}: {}", instance_id, message);

        Ok(BackupSummary {
            instance_id,
            files: files_committed,
            bytes: total_bytes,
            message,
        })
    }
}
