//! Restore resolver command surface.

use super::FileDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum RestoreRequest {
    GetRestorePlan(RestorePlanArgs),
    RequestFileRestore(FileRestoreArgs),
    ListInstances(ListInstancesArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePlanArgs {
    pub instance_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRestoreArgs {
    pub instance_id: i64,
    pub relative_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInstancesArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Storage tier that satisfied a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMedium {
    LocalPrimary,
    LocalSecondary,
    Cloud,
}

impl SourceMedium {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMedium::LocalPrimary => "local_primary",
            SourceMedium::LocalSecondary => "local_secondary",
            SourceMedium::Cloud => "cloud",
        }
    }
}

impl fmt::Display for SourceMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum RestorePlanResponse {
    #[serde(rename = "OK")]
    Plan {
        instance_structure: String,
        files: Vec<FileDescriptor>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "ERROR")]
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum FileRestoreResponse {
    #[serde(rename = "OK")]
    Restored {
        relative_path: String,
        content_b64: String,
        source_medium: SourceMedium,
        original_hash: String,
    },

    /// Every source was tried and none produced verified content.
    #[serde(rename = "FAIL")]
    Unavailable {
        relative_path: String,
        message: String,
    },

    #[serde(rename = "ERROR")]
    Failed { message: String },
}

/// One committed backup instance as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: i64,
    pub created_at: String,
    pub total_size: u64,
    pub structure: String,
    #[serde(default)]
    pub auto_job_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ListInstancesResponse {
    #[serde(rename = "OK")]
    Instances { instances: Vec<InstanceSummary> },

    #[serde(rename = "ERROR")]
    Failed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_command;

    #[test]
    fn test_decode_restore_commands() {
        let request: RestoreRequest =
            decode_command(r#"request_file_restore|{"instance_id":7,"relative_path":"dir/a.txt"}"#)
                .unwrap();
        assert_eq!(
            request,
            RestoreRequest::RequestFileRestore(FileRestoreArgs {
                instance_id: 7,
                relative_path: "dir/a.txt".into(),
            })
        );

        let request: RestoreRequest = decode_command("list_instances|").unwrap();
        assert_eq!(request, RestoreRequest::ListInstances(ListInstancesArgs::default()));
    }

    #[test]
    fn test_file_restore_fail_status() {
        let parsed: FileRestoreResponse = serde_json::from_str(
            r#"{"status":"FAIL","relative_path":"a.txt","message":"all sources failed"}"#,
        )
        .unwrap();
        assert!(matches!(parsed, FileRestoreResponse::Unavailable { .. }));
    }

    #[test]
    fn test_source_medium_wire_names() {
        assert_eq!(
            serde_json::to_string(&SourceMedium::LocalSecondary).unwrap(),
            "\"local_secondary\""
        );
        assert_eq!(SourceMedium::Cloud.to_string(), "cloud");
    }
}
