//! Cloud tier, reached through the cloud service on the bus.

use crate::restore::source::{RestoreSource, SourceFailure};
use crate::storage::remote_path;
use async_trait::async_trait;
use backup_bus::protocol::cloud::{CloudRequest, CloudResponse};
use backup_bus::protocol::restore::SourceMedium;
use backup_bus::protocol::{decode_content, encode_command, encode_content};
use backup_bus::session::transact;
use backup_bus::BusConfig;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone)]
pub enum CloudError {
    /// The bus could not deliver the request or reply
    #[error("cloud service unreachable: {0}")]
    Unavailable(String),

    #[error("cloud service refused: {0}")]
    Rejected(String),

    #[error("cloud service sent a malformed reply: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait CloudGateway: Send + Sync {
    async fn store(&self, remote_path: &str, content: &[u8]) -> Result<(), CloudError>;
    async fn fetch(&self, remote_path: &str) -> Result<Vec<u8>, CloudError>;
    async fn delete(&self, remote_path: &str) -> Result<(), CloudError>;
    /// SHA-256 hex of the object at `remote_path`, `None` if there is none.
    async fn stat(&self, remote_path: &str) -> Result<Option<String>, CloudError>;
}

/// Fields of a successful cloud reply.
#[derive(Debug)]
struct Ack {
    content_b64: Option<String>,
    sha256: Option<String>,
}

/// Speaks `store`/`fetch`/`delete` to the cloud service, one bus exchange per
/// call.
pub struct BusCloudGateway {
    bus: BusConfig,
    service: String,
}

impl BusCloudGateway {
    pub fn new(bus: BusConfig, service: impl Into<String>) -> Self {
        Self {
            bus,
            service: service.into(),
        }
    }

    async fn exchange(&self, request: &CloudRequest) -> Result<Ack, CloudError> {
        let data = encode_command(request).map_err(|e| CloudError::Malformed(e.to_string()))?;
        let reply = transact(&self.bus, &self.service, &data).await;
        if !reply.is_ok() {
            return Err(CloudError::Unavailable(format!("{} {}", reply.status, reply.content)));
        }
        match serde_json::from_str::<CloudResponse>(&reply.content) {
            Ok(CloudResponse::Done { content_b64, sha256 }) => Ok(Ack { content_b64, sha256 }),
            Ok(CloudResponse::Failed { message }) => Err(CloudError::Rejected(message)),
            Err(e) => Err(CloudError::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl CloudGateway for BusCloudGateway {
    async fn store(&self, remote_path: &str, content: &[u8]) -> Result<(), CloudError> {
        self.exchange(&CloudRequest::Store {
            remote_path: remote_path.to_string(),
            content_b64: encode_content(content),
        })
        .await
        .map(|_| ())
    }

    async fn fetch(&self, remote_path: &str) -> Result<Vec<u8>, CloudError> {
        let content_b64 = self
            .exchange(&CloudRequest::Fetch {
                remote_path: remote_path.to_string(),
            })
            .await?
            .content_b64
            .ok_or_else(|| CloudError::Malformed("fetch reply carries no content".into()))?;
        decode_content(&content_b64).map_err(|e| CloudError::Malformed(e.to_string()))
    }

    async fn delete(&self, remote_path: &str) -> Result<(), CloudError> {
        self.exchange(&CloudRequest::Delete {
            remote_path: remote_path.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn stat(&self, remote_path: &str) -> Result<Option<String>, CloudError> {
        self.exchange(&CloudRequest::Stat {
            remote_path: remote_path.to_string(),
        })
        .await
        .map(|ack| ack.sha256)
    }
}

/// Restore source backed by a [`CloudGateway`].
pub struct CloudSource {
    gateway: Arc<dyn CloudGateway>,
}

impl CloudSource {
    pub fn new(gateway: Arc<dyn CloudGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl RestoreSource for CloudSource {
    fn medium(&self) -> SourceMedium {
        SourceMedium::Cloud
    }

    async fn read(&self, structure: &str, relative_path: &str) -> Result<Vec<u8>, SourceFailure> {
        self.gateway
            .fetch(&remote_path(structure, relative_path))
            .await
            .map_err(|e| SourceFailure::GatewayError(e.to_string()))
    }
}
