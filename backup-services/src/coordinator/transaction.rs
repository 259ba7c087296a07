use backup_bus::protocol::FileDescriptor;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Opaque 128-bit transaction token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Failed,
}

/// Something physical a transaction created and must delete on rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Local(PathBuf),
    Cloud(String),
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Local(path) => write!(f, "{}", path.display()),
            Artifact::Cloud(remote) => write!(f, "cloud:{}", remote),
        }
    }
}

#[derive(Debug)]
pub struct Transaction {
    pub id: TransactionId,
    pub structure: String,
    pub auto_job_id: Option<i64>,
    /// Declared paths not uploaded yet
    pub expected: HashSet<String>,
    pub completed: Vec<FileDescriptor>,
    pub artifacts: Vec<Artifact>,
    /// Remote paths reserved by this transaction
    pub claims: Vec<String>,
    pub status: TransactionStatus,
    /// Set once the transaction has left the registry; nothing may touch it
    /// afterwards.
    pub retired: bool,
    started: Instant,
}

impl Transaction {
    pub fn new(structure: String, expected: HashSet<String>, auto_job_id: Option<i64>) -> Self {
        Self {
            id: TransactionId::new(),
            structure,
            auto_job_id,
            expected,
            completed: Vec::new(),
            artifacts: Vec::new(),
            claims: Vec::new(),
            status: TransactionStatus::Pending,
            retired: false,
            started: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn total_size(&self) -> u64 {
        self.completed.iter().map(|f| f.size).sum()
    }

    pub fn poison(&mut self) {
        self.status = TransactionStatus::Failed;
    }
}

pub type SharedTransaction = Arc<Mutex<Transaction>>;

/// Live transactions keyed by token. Each entry carries its own lock so
/// independent transactions never wait on each other.
#[derive(Default)]
pub struct TransactionRegistry {
    transactions: DashMap<TransactionId, SharedTransaction>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, transaction: Transaction) -> TransactionId {
        let id = transaction.id;
        self.transactions.insert(id, Arc::new(Mutex::new(transaction)));
        id
    }

    pub fn get(&self, id: &TransactionId) -> Option<SharedTransaction> {
        self.transactions.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &TransactionId) -> Option<SharedTransaction> {
        self.transactions.remove(id).map(|(_, tx)| tx)
    }

    /// Remove `id` only if it still maps to `transaction`.
    pub fn remove_if_same(&self, id: &TransactionId, transaction: &SharedTransaction) -> bool {
        self.transactions
            .remove_if(id, |_, current| Arc::ptr_eq(current, transaction))
            .is_some()
    }

    /// Snapshot of all entries; holds no map locks once returned.
    pub fn entries(&self) -> Vec<(TransactionId, SharedTransaction)> {
        self.transactions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
