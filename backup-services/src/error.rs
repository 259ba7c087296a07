use backup_bus::protocol::error_body;
use backup_bus::CommandError;

/// Outcome of a failed coordinator or resolver operation.
///
/// Every variant ends up as a structured `ERROR` response; none of them
/// escapes the service boundary.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// Unknown or retired transaction, unexpected file, invalid path or body
    #[error("{0}")]
    Protocol(String),

    /// Storage tier, cloud gateway or metadata store failure
    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    NotFound(String),

    /// The transaction was rolled back instead of committed
    #[error("{0}")]
    RolledBack(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Message safe to send back to the caller.
    pub fn message(&self) -> String {
        match self {
            ServiceError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                "Internal service error".into()
            }
            other => other.to_string(),
        }
    }

    /// `{"status":"ERROR","message":...}`
    pub fn to_response(&self) -> String {
        error_body(&self.message())
    }
}

impl From<CommandError> for ServiceError {
    fn from(err: CommandError) -> Self {
        ServiceError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = ServiceError::from(anyhow::anyhow!("disk /dev/sda1 on fire"));
        let body: Value = serde_json::from_str(&err.to_response()).unwrap();
        assert_eq!(body["status"], "ERROR");
        assert_eq!(body["message"], "Internal service error");
    }

    #[test]
    fn test_command_errors_become_protocol_errors() {
        let err = ServiceError::from(CommandError::Malformed);
        assert!(matches!(err, ServiceError::Protocol(_)));
        assert!(err.message().contains("<command>|<json>"));
    }
}
