//! Backup transaction coordinator.
//!
//! A transaction collects uploads for one backup instance. Every upload is
//! written to the primary tier, then the secondary tier, then the cloud, in
//! that order. The catalog only ever sees a transaction whose declared files
//! all reached all three tiers; anything else is rolled back.
//!
//! Copies are never replaced. An identical copy already on a tier (left by an
//! earlier instance of the same structure) is shared and never rolled back;
//! a different one fails the upload. Only what a transaction created itself
//! is ever deleted.

pub mod service;
pub mod transaction;

pub use service::BackupService;
pub use transaction::{Artifact, Transaction, TransactionId, TransactionRegistry, TransactionStatus};

use crate::error::ServiceError;
use crate::restore::source::RestoreSource as _;
use crate::storage::{remote_path, CloudGateway, LocalTier, Placement};
use crate::store::{MetadataStore, NewInstance};
use backup_bus::fs::relative_key_to_path;
use backup_bus::protocol::FileDescriptor;
use backup_bus::utils::hash::sha256_hex;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of a successful `end_backup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub instance_id: i64,
    pub files_committed: usize,
}

pub struct Coordinator {
    registry: Arc<TransactionRegistry>,
    primary: LocalTier,
    secondary: LocalTier,
    cloud: Arc<dyn CloudGateway>,
    store: Arc<dyn MetadataStore>,
    /// Remote path -> pending transaction writing it
    claims: DashMap<String, TransactionId>,
}

fn unknown_transaction() -> ServiceError {
    ServiceError::Protocol("unknown transaction".into())
}

fn parse_id(id: &str) -> Result<TransactionId, ServiceError> {
    id.parse().map_err(|_| unknown_transaction())
}

impl Coordinator {
    pub fn new(
        registry: Arc<TransactionRegistry>,
        primary: LocalTier,
        secondary: LocalTier,
        cloud: Arc<dyn CloudGateway>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            registry,
            primary,
            secondary,
            cloud,
            store,
            claims: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// Open a transaction expecting exactly `files`. Nothing is written yet.
    pub async fn begin_backup(
        &self,
        structure: &str,
        files: &[String],
        auto_job_id: Option<i64>,
    ) -> Result<TransactionId, ServiceError> {
        relative_key_to_path(structure)
            .map_err(|e| ServiceError::Protocol(format!("invalid path: structure {}", e)))?;
        for path in files {
            relative_key_to_path(path).map_err(|e| ServiceError::Protocol(format!("invalid path: {}", e)))?;
        }

        let expected: HashSet<String> = files.iter().cloned().collect();
        let count = expected.len();
        let id = self
            .registry
            .insert(Transaction::new(structure.to_string(), expected, auto_job_id));

        info!("Transaction {} started for '{}' expecting {} file(s)", id, structure, count);
        Ok(id)
    }

    /// Store one declared file on all three tiers.
    ///
    /// Any failure poisons the transaction. Artifacts created by this call are
    /// removed before returning; earlier ones stay until `end_backup`.
    pub async fn upload_file(
        &self,
        id: &str,
        relative_path: &str,
        content: &[u8],
    ) -> Result<FileDescriptor, ServiceError> {
        let id = parse_id(id)?;
        let shared = self.registry.get(&id).ok_or_else(unknown_transaction)?;
        let mut tx = shared.lock().await;

        if tx.retired {
            return Err(unknown_transaction());
        }
        if tx.status == TransactionStatus::Failed {
            return Err(ServiceError::Protocol("transaction already failed".into()));
        }
        if !tx.expected.contains(relative_path) {
            tx.poison();
            warn!("Transaction {} received undeclared file '{}'", id, relative_path);
            return Err(ServiceError::Protocol(format!("unexpected file '{}'", relative_path)));
        }

        let hash = sha256_hex(content);
        let remote = remote_path(&tx.structure, relative_path);
        if let Err(e) = self.claim(&remote, id) {
            tx.poison();
            return Err(e);
        }
        tx.claims.push(remote.clone());

        let mut created = Vec::with_capacity(3);
        for tier in [&self.primary, &self.secondary] {
            let path = tier.path_for(&tx.structure, relative_path)?;
            match tier.place(&path, content).await {
                Ok(Placement::Created) => created.push(Artifact::Local(path)),
                Ok(Placement::Existing) => {
                    debug!("{} already holds '{}'; sharing it", tier.medium(), remote)
                }
                Err(e) => {
                    let err = ServiceError::Backend(format!(
                        "{} write of '{}' failed: {}",
                        tier.medium(),
                        relative_path,
                        e
                    ));
                    return Err(self.fail_call(&mut tx, &created, err).await);
                }
            }
        }

        let stored = match self.cloud.stat(&remote).await {
            Ok(None) => self.cloud.store(&remote, content).await.map(|_| true),
            Ok(Some(existing)) if existing.eq_ignore_ascii_case(&hash) => Ok(false),
            Ok(Some(_)) => {
                let err = ServiceError::Backend(format!(
                    "cloud already holds a different copy of '{}'",
                    relative_path
                ));
                return Err(self.fail_call(&mut tx, &created, err).await);
            }
            Err(e) => Err(e),
        };
        match stored {
            Ok(true) => created.push(Artifact::Cloud(remote)),
            Ok(false) => debug!("cloud already holds '{}'; sharing it", remote),
            Err(e) => {
                let err = ServiceError::Backend(format!("cloud store of '{}' failed: {}", relative_path, e));
                return Err(self.fail_call(&mut tx, &created, err).await);
            }
        }

        let descriptor = FileDescriptor {
            relative_path: relative_path.to_string(),
            hash,
            size: content.len() as u64,
        };
        tx.completed.push(descriptor.clone());
        tx.artifacts.extend(created);
        tx.expected.remove(relative_path);

        info!(
            "Transaction {}: stored '{}' ({} bytes, {} remaining)",
            id,
            relative_path,
            descriptor.size,
            tx.expected.len()
        );
        Ok(descriptor)
    }

    /// Retire the transaction: commit it to the catalog, or roll it back when
    /// it was aborted, failed, or is missing files.
    pub async fn end_backup(&self, id: &str, abort: bool) -> Result<CommitOutcome, ServiceError> {
        let id = parse_id(id)?;
        let shared = self.registry.remove(&id).ok_or_else(unknown_transaction)?;
        let mut tx = shared.lock().await;
        tx.retired = true;

        let outcome = self.settle(&tx, abort).await;
        self.release(&tx);
        outcome
    }

    async fn settle(&self, tx: &Transaction, abort: bool) -> Result<CommitOutcome, ServiceError> {
        let reason = if abort {
            Some("aborted".to_string())
        } else if tx.status == TransactionStatus::Failed {
            Some("upload failure".to_string())
        } else if !tx.expected.is_empty() {
            Some(format!("{} file(s) missing", tx.expected.len()))
        } else {
            None
        };

        if let Some(reason) = reason {
            self.rollback(&tx.artifacts).await;
            info!("Transaction {} rolled back: {}", tx.id, reason);
            return Err(ServiceError::RolledBack(format!("backup rolled back: {}", reason)));
        }

        let instance = NewInstance {
            structure: tx.structure.clone(),
            total_size: tx.total_size(),
            files: tx.completed.clone(),
            auto_job_id: tx.auto_job_id,
        };
        match self.store.insert_instance_and_files(instance).await {
            Ok(instance_id) => {
                info!(
                    "Transaction {} committed as instance {} ({} file(s))",
                    tx.id,
                    instance_id,
                    tx.completed.len()
                );
                Ok(CommitOutcome {
                    instance_id,
                    files_committed: tx.completed.len(),
                })
            }
            Err(e) => {
                // Copies without a catalog entry can never be restored
                error!("Catalog write for transaction {} failed: {e:#}", tx.id);
                self.rollback(&tx.artifacts).await;
                Err(ServiceError::Backend(format!("catalog write failed: {}", e)))
            }
        }
    }

    /// Abort a transaction whose client can no longer be reached.
    pub async fn abandon(&self, id: &str) {
        match self.end_backup(id, true).await {
            Err(ServiceError::RolledBack(_)) => warn!("Transaction {} abandoned and rolled back", id),
            Err(e) => warn!("Could not abandon transaction {}: {}", id, e),
            Ok(_) => {}
        }
    }

    /// Roll back every transaction started more than `max_age` ago. Returns
    /// how many were reaped. Transactions busy with a request are skipped.
    pub async fn reap_expired(&self, max_age: Duration) -> usize {
        let mut reaped = 0;
        for (id, shared) in self.registry.entries() {
            let Ok(mut tx) = shared.try_lock() else {
                continue;
            };
            if tx.retired || tx.age() < max_age {
                continue;
            }
            if !self.registry.remove_if_same(&id, &shared) {
                continue;
            }
            tx.retired = true;
            warn!(
                "Reaping transaction {} for '{}' after {}s ({} artifact(s))",
                id,
                tx.structure,
                tx.age().as_secs(),
                tx.artifacts.len()
            );
            self.rollback(&tx.artifacts).await;
            self.release(&tx);
            reaped += 1;
        }
        reaped
    }

    /// Roll back every transaction still open, waiting for any upload in
    /// progress to finish first. Used on shutdown, since pending transactions
    /// cannot outlive the process.
    pub async fn roll_back_pending(&self) -> usize {
        let mut rolled_back = 0;
        for (id, shared) in self.registry.entries() {
            if !self.registry.remove_if_same(&id, &shared) {
                continue;
            }
            let mut tx = shared.lock().await;
            if tx.retired {
                continue;
            }
            tx.retired = true;
            warn!(
                "Rolling back open transaction {} for '{}' ({} artifact(s))",
                id,
                tx.structure,
                tx.artifacts.len()
            );
            self.rollback(&tx.artifacts).await;
            self.release(&tx);
            rolled_back += 1;
        }
        rolled_back
    }

    /// Reserve `remote` for transaction `id` until it retires.
    fn claim(&self, remote: &str, id: TransactionId) -> Result<(), ServiceError> {
        match self.claims.entry(remote.to_string()) {
            Entry::Occupied(owner) if *owner.get() != id => Err(ServiceError::Protocol(format!(
                "'{}' is being uploaded by another transaction",
                remote
            ))),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn release(&self, tx: &Transaction) {
        for remote in &tx.claims {
            self.claims.remove_if(remote, |_, owner| *owner == tx.id);
        }
    }

    /// Poison `tx` and undo what the failing call created.
    async fn fail_call(&self, tx: &mut Transaction, created: &[Artifact], err: ServiceError) -> ServiceError {
        tx.poison();
        self.rollback(created).await;
        err
    }

    /// Best-effort delete of `artifacts`, newest first. Returns how many could
    /// not be deleted.
    async fn rollback(&self, artifacts: &[Artifact]) -> usize {
        let mut failures = 0;
        for artifact in artifacts.iter().rev() {
            let result = match artifact {
                Artifact::Local(path) => LocalTier::remove(path).await.map_err(|e| e.to_string()),
                Artifact::Cloud(remote) => self.cloud.delete(remote).await.map_err(|e| e.to_string()),
            };
            if let Err(e) = result {
                failures += 1;
                warn!("Rollback could not delete {}: {}", artifact, e);
            }
        }
        failures
    }
}
