use async_trait::async_trait;
use backup_bus::protocol::restore::SourceMedium;

/// Why one source could not supply a verified copy.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceFailure {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("read error: {0}")]
    ReadError(String),

    #[error("gateway error: {0}")]
    GatewayError(String),

    #[error("integrity error: {0}")]
    IntegrityError(String),
}

impl SourceFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceFailure::NotFound(_) => "not_found",
            SourceFailure::ReadError(_) => "read_error",
            SourceFailure::GatewayError(_) => "gateway_error",
            SourceFailure::IntegrityError(_) => "integrity_error",
        }
    }
}

/// One place a backed up file can be read back from.
///
/// Implementations only read; verification is the resolver's job.
#[async_trait]
pub trait RestoreSource: Send + Sync {
    fn medium(&self) -> SourceMedium;

    async fn read(&self, structure: &str, relative_path: &str) -> Result<Vec<u8>, SourceFailure>;
}
