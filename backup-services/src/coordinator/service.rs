use super::Coordinator;
use crate::error::ServiceError;
use async_trait::async_trait;
use backup_bus::protocol::backup::{
    BackupRequest, BeginBackupResponse, EndBackupResponse, UploadFileResponse,
};
use backup_bus::protocol::{decode_command, decode_content, encode_response, error_body};
use backup_bus::RequestHandler;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bus handler for `begin_backup`, `upload_file` and `end_backup`.
pub struct BackupService {
    coordinator: Arc<Coordinator>,
}

impl BackupService {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    async fn dispatch(&self, request: BackupRequest) -> String {
        match request {
            BackupRequest::BeginBackup(args) => {
                let files: Vec<String> = args
                    .files_to_backup
                    .into_iter()
                    .map(|f| f.relative_path)
                    .collect();
                let response = match self
                    .coordinator
                    .begin_backup(&args.structure, &files, args.auto_job_id)
                    .await
                {
                    Ok(id) => BeginBackupResponse::Started {
                        transaction_id: id.to_string(),
                    },
                    Err(e) => BeginBackupResponse::Failed { message: e.message() },
                };
                encode_response(&response)
            }
            BackupRequest::UploadFile(args) => {
                // Undecodable content is refused without touching the transaction
                let result = match decode_content(&args.content_b64) {
                    Ok(content) => {
                        self.coordinator
                            .upload_file(&args.transaction_id, &args.relative_path, &content)
                            .await
                    }
                    Err(e) => Err(ServiceError::from(e)),
                };
                let response = match result {
                    Ok(file) => UploadFileResponse::Processed {
                        file_processed: file.relative_path,
                    },
                    Err(e) => UploadFileResponse::Failed { message: e.message() },
                };
                encode_response(&response)
            }
            BackupRequest::EndBackup(args) => {
                let response = match self.coordinator.end_backup(&args.transaction_id, args.abort).await {
                    Ok(outcome) => EndBackupResponse::Committed {
                        message: format!(
                            "backup committed: {} file(s) in instance {}",
                            outcome.files_committed, outcome.instance_id
                        ),
                        instance_id: outcome.instance_id,
                        files_committed: outcome.files_committed,
                    },
                    Err(e) => EndBackupResponse::Failed { message: e.message() },
                };
                encode_response(&response)
            }
        }
    }
}

#[async_trait]
impl RequestHandler for BackupService {
    async fn handle(&self, request: &str) -> String {
        match decode_command::<BackupRequest>(request) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                debug!("Rejected backup request: {}", e);
                ServiceError::from(e).to_response()
            }
        }
    }

    fn error_response(&self, message: &str) -> String {
        error_body(message)
    }

    /// A client that missed a `begin_backup` or `upload_file` reply cannot
    /// continue its transaction, so it is rolled back right away.
    async fn undelivered(&self, request: &str, response: &str) {
        let transaction_id = match decode_command::<BackupRequest>(request) {
            Ok(BackupRequest::BeginBackup(_)) => {
                match serde_json::from_str::<BeginBackupResponse>(response) {
                    Ok(BeginBackupResponse::Started { transaction_id }) => transaction_id,
                    _ => return,
                }
            }
            Ok(BackupRequest::UploadFile(args)) => args.transaction_id,
            Ok(BackupRequest::EndBackup(args)) => {
                warn!("Reply to end_backup for {} was not delivered", args.transaction_id);
                return;
            }
            Err(_) => return,
        };
        warn!("Reply for transaction {} was not delivered; abandoning it", transaction_id);
        self.coordinator.abandon(&transaction_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::harness;
    use backup_bus::frame::{encode, parse_length, LENGTH_FIELD_LEN, SERVICE_FIELD_LEN};
    use backup_bus::protocol::encode_content;
    use backup_bus::{run_service, BusConfig, RestartPolicy};
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::sync::CancellationToken;

    fn begin(structure: &str) -> String {
        format!(
            r#"begin_backup|{{"structure":"{}","files_to_backup":[{{"relative_path":"a.txt"}}]}}"#,
            structure
        )
    }

    fn field(body: &str, name: &str) -> Value {
        serde_json::from_str::<Value>(body).unwrap()[name].clone()
    }

    #[tokio::test]
    async fn test_end_to_end_over_handler() {
        let h = harness();
        let service = BackupService::new(h.coordinator.clone());

        let started = service.handle(&begin("docs")).await;
        assert_eq!(field(&started, "status"), "OK");
        let id = field(&started, "transaction_id").as_str().unwrap().to_string();

        let uploaded = service
            .handle(&format!(
                r#"upload_file|{{"transaction_id":"{}","relative_path":"a.txt","content_b64":"{}"}}"#,
                id,
                encode_content(b"hello")
            ))
            .await;
        assert_eq!(field(&uploaded, "status"), "OK");
        assert_eq!(field(&uploaded, "file_processed"), "a.txt");

        let end = format!(r#"end_backup|{{"transaction_id":"{}"}}"#, id);
        let committed = service.handle(&end).await;
        assert_eq!(field(&committed, "status"), "OK");
        assert!(field(&committed, "message").as_str().unwrap().contains("1 file(s)"));

        let again = service.handle(&end).await;
        assert_eq!(field(&again, "status"), "ERROR");
        assert_eq!(field(&again, "message"), "unknown transaction");
    }

    #[tokio::test]
    async fn test_malformed_requests_get_error_bodies() {
        let h = harness();
        let service = BackupService::new(h.coordinator.clone());

        for request in ["no separator", "begin_backup|{not json", "format_disk|{}"] {
            let body = service.handle(request).await;
            assert_eq!(field(&body, "status"), "ERROR", "{}", request);
        }
    }

    #[tokio::test]
    async fn test_bad_base64_does_not_poison_transaction() {
        let h = harness();
        let service = BackupService::new(h.coordinator.clone());
        let id = field(&service.handle(&begin("docs")).await, "transaction_id")
            .as_str()
            .unwrap()
            .to_string();

        let bad = service
            .handle(&format!(
                r#"upload_file|{{"transaction_id":"{}","relative_path":"a.txt","content_b64":"***"}}"#,
                id
            ))
            .await;
        assert_eq!(field(&bad, "status"), "ERROR");

        let good = service
            .handle(&format!(
                r#"upload_file|{{"transaction_id":"{}","relative_path":"a.txt","content_b64":"{}"}}"#,
                id,
                encode_content(b"hello")
            ))
            .await;
        assert_eq!(field(&good, "status"), "OK");
    }

    #[tokio::test]
    async fn test_undelivered_begin_abandons_transaction() {
        let h = harness();
        let service = BackupService::new(h.coordinator.clone());

        let request = begin("docs");
        let response = service.handle(&request).await;
        assert_eq!(h.coordinator.registry().len(), 1);

        service.undelivered(&request, &response).await;
        assert!(h.coordinator.registry().is_empty());
    }

    async fn send(stream: &mut TcpStream, service: &str, data: &str) {
        stream.write_all(&encode(service, data.as_bytes()).unwrap()).await.unwrap();
    }

    async fn recv(stream: &mut TcpStream) -> String {
        let mut length = [0u8; LENGTH_FIELD_LEN];
        stream.read_exact(&mut length).await.unwrap();
        let mut payload = vec![0u8; parse_length(&length).unwrap()];
        stream.read_exact(&mut payload).await.unwrap();
        String::from_utf8(payload[SERVICE_FIELD_LEN..].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_mid_transaction_leaves_no_copies() {
        let h = harness();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bus = BusConfig::new("127.0.0.1", listener.local_addr().unwrap().port());
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(run_service(
            bus,
            "bkpsv".to_string(),
            Arc::new(BackupService::new(h.coordinator.clone())),
            RestartPolicy::default(),
            shutdown.clone(),
        ));

        let (mut stream, _) = listener.accept().await.unwrap();
        assert_eq!(recv(&mut stream).await, "bkpsv");
        send(&mut stream, "sinit", "OK").await;

        send(&mut stream, "bkpsv", &begin("docs")).await;
        let id = field(&recv(&mut stream).await, "transaction_id")
            .as_str()
            .unwrap()
            .to_string();
        let upload = format!(
            r#"upload_file|{{"transaction_id":"{}","relative_path":"a.txt","content_b64":"{}"}}"#,
            id,
            encode_content(b"hello")
        );
        send(&mut stream, "bkpsv", &upload).await;
        assert_eq!(field(&recv(&mut stream).await, "status"), "OK");
        assert_eq!(h.local_artifacts(), 2);

        shutdown.cancel();
        assert!(supervisor.await.unwrap().is_ok());

        assert_eq!(h.coordinator.roll_back_pending().await, 1);
        assert_eq!(h.local_artifacts(), 0);
        assert_eq!(h.cloud.len(), 0);
    }

    #[tokio::test]
    async fn test_undelivered_end_is_only_logged() {
        let h = harness();
        let service = BackupService::new(h.coordinator.clone());
        let other = service.handle(&begin("other")).await;
        assert_eq!(field(&other, "status"), "OK");

        service
            .undelivered(r#"end_backup|{"transaction_id":"whatever"}"#, "{}")
            .await;
        assert_eq!(h.coordinator.registry().len(), 1);
    }
}
