use super::{RestoreError, Resolver};
use crate::error::ServiceError;
use async_trait::async_trait;
use backup_bus::frame::{MAX_PAYLOAD_LEN, SERVICE_FIELD_LEN};
use backup_bus::protocol::restore::{
    FileRestoreResponse, InstanceSummary, ListInstancesResponse, RestorePlanResponse, RestoreRequest,
};
use backup_bus::protocol::{decode_command, encode_content, encode_response, error_body};
use backup_bus::RequestHandler;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_LIST_LIMIT: u32 = 100;

/// Bus handler for `get_restore_plan`, `request_file_restore` and
/// `list_instances`.
pub struct RestoreService {
    resolver: Arc<Resolver>,
}

impl RestoreService {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    async fn dispatch(&self, request: RestoreRequest) -> String {
        match request {
            RestoreRequest::GetRestorePlan(args) => {
                let response = match self.resolver.get_restore_plan(args.instance_id).await {
                    Ok(plan) => RestorePlanResponse::Plan {
                        message: plan.files.is_empty().then(|| "instance has no files".to_string()),
                        instance_structure: plan.structure,
                        files: plan.files,
                    },
                    Err(e) => RestorePlanResponse::Failed { message: e.message() },
                };
                encode_response(&response)
            }
            RestoreRequest::RequestFileRestore(args) => {
                let response = match self
                    .resolver
                    .restore_file(args.instance_id, &args.relative_path)
                    .await
                {
                    Ok(file) => FileRestoreResponse::Restored {
                        relative_path: args.relative_path.clone(),
                        content_b64: encode_content(&file.content),
                        source_medium: file.source,
                        original_hash: file.hash,
                    },
                    Err(RestoreError::Exhausted { medium, failure }) => FileRestoreResponse::Unavailable {
                        relative_path: args.relative_path.clone(),
                        message: format!("all sources failed; last {} {}", medium, failure),
                    },
                    Err(RestoreError::Service(e)) => FileRestoreResponse::Failed { message: e.message() },
                };
                let body = encode_response(&response);
                if fits_in_frame(&body) {
                    body
                } else {
                    encode_response(&FileRestoreResponse::Unavailable {
                        relative_path: args.relative_path,
                        message: format!(
                            "restored content does not fit in one bus frame ({} byte limit)",
                            MAX_PAYLOAD_LEN
                        ),
                    })
                }
            }
            RestoreRequest::ListInstances(args) => {
                let limit = args.limit.unwrap_or(DEFAULT_LIST_LIMIT);
                let response = match self.resolver.list_instances(limit).await {
                    Ok(instances) => ListInstancesResponse::Instances {
                        instances: instances
                            .into_iter()
                            .map(|i| InstanceSummary {
                                id: i.id,
                                created_at: i.created_at,
                                total_size: i.total_size.max(0) as u64,
                                structure: i.structure,
                                auto_job_id: i.auto_job_id,
                            })
                            .collect(),
                    },
                    Err(e) => ListInstancesResponse::Failed { message: e.message() },
                };
                encode_response(&response)
            }
        }
    }
}

fn fits_in_frame(body: &str) -> bool {
    SERVICE_FIELD_LEN + body.len() <= MAX_PAYLOAD_LEN
}

#[async_trait]
impl RequestHandler for RestoreService {
    async fn handle(&self, request: &str) -> String {
        match decode_command::<RestoreRequest>(request) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                debug!("Rejected restore request: {}", e);
                ServiceError::from(e).to_response()
            }
        }
    }

    fn error_response(&self, message: &str) -> String {
        error_body(message)
    }
}
