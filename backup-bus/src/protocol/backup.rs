//! Backup coordinator command surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum BackupRequest {
    BeginBackup(BeginBackupArgs),
    UploadFile(UploadFileArgs),
    EndBackup(EndBackupArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginBackupArgs {
    /// Destination namespace
    pub structure: String,
    pub files_to_backup: Vec<FileToBackup>,
    /// Recurring job that triggered this backup, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_job_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileToBackup {
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFileArgs {
    pub transaction_id: String,
    pub relative_path: String,
    pub content_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBackupArgs {
    pub transaction_id: String,
    #[serde(default)]
    pub abort: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum BeginBackupResponse {
    #[serde(rename = "OK")]
    Started { transaction_id: String },

    #[serde(rename = "ERROR")]
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum UploadFileResponse {
    #[serde(rename = "OK")]
    Processed { file_processed: String },

    #[serde(rename = "ERROR")]
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum EndBackupResponse {
    #[serde(rename = "OK")]
    Committed {
        message: String,
        instance_id: i64,
        files_committed: usize,
    },

    #[serde(rename = "ERROR")]
    Failed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_command, encode_command, encode_response};
    use crate::utils::errors::CommandError;

    #[test]
    fn test_decode_begin_backup() {
        let request: BackupRequest = decode_command(
            r#"begin_backup|{"structure":"docs","files_to_backup":[{"relative_path":"a.txt"}]}"#,
        )
        .unwrap();

        assert_eq!(
            request,
            BackupRequest::BeginBackup(BeginBackupArgs {
                structure: "docs".into(),
                files_to_backup: vec![FileToBackup {
                    relative_path: "a.txt".into()
                }],
                auto_job_id: None,
            })
        );
    }

    #[test]
    fn test_end_backup_abort_defaults_to_false() {
        let request: BackupRequest =
            decode_command(r#"end_backup|{"transaction_id":"t-1"}"#).unwrap();
        assert_eq!(
            request,
            BackupRequest::EndBackup(EndBackupArgs {
                transaction_id: "t-1".into(),
                abort: false,
            })
        );
    }

    #[test]
    fn test_encode_command_matches_wire_form() {
        let wire = encode_command(&BackupRequest::EndBackup(EndBackupArgs {
            transaction_id: "t-1".into(),
            abort: true,
        }))
        .unwrap();

        let (command, body) = wire.split_once('|').unwrap();
        assert_eq!(command, "end_backup");
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, serde_json::json!({ "transaction_id": "t-1", "abort": true }));
    }

    #[test]
    fn test_rejects_unknown_command_and_missing_fields() {
        assert!(matches!(
            decode_command::<BackupRequest>(r#"drop_tables|{}"#),
            Err(CommandError::Invalid(_))
        ));
        assert!(matches!(
            decode_command::<BackupRequest>(r#"upload_file|{"transaction_id":"t"}"#),
            Err(CommandError::Invalid(_))
        ));
        assert!(matches!(
            decode_command::<BackupRequest>("upload_file"),
            Err(CommandError::Malformed)
        ));
        assert!(matches!(
            decode_command::<BackupRequest>("upload_file|{not json"),
            Err(CommandError::Json(_))
        ));
    }

    #[test]
    fn test_response_status_tags() {
        let body = encode_response(&UploadFileResponse::Processed {
            file_processed: "a.txt".into(),
        });
        assert_eq!(body, r#"{"status":"OK","file_processed":"a.txt"}"#);

        let parsed: EndBackupResponse =
            serde_json::from_str(r#"{"status":"ERROR","message":"aborted"}"#).unwrap();
        assert_eq!(
            parsed,
            EndBackupResponse::Failed {
                message: "aborted".into()
            }
        );
    }
}
