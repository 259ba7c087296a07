//! Cloud gateway command surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum CloudRequest {
    Store {
        remote_path: String,
        content_b64: String,
    },
    Fetch {
        remote_path: String,
    },
    Delete {
        remote_path: String,
    },
    /// Ask for the SHA-256 of an object without transferring it
    Stat {
        remote_path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CloudResponse {
    #[serde(rename = "OK")]
    Done {
        /// Present on successful fetches
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_b64: Option<String>,
        /// Answer to `stat`; absent when no object exists at the path
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },

    #[serde(rename = "ERROR")]
    Failed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_command, encode_command};

    #[test]
    fn test_cloud_request_wire_form() {
        let wire = encode_command(&CloudRequest::Fetch {
            remote_path: "docs/a.txt".into(),
        })
        .unwrap();
        assert_eq!(wire, r#"fetch|{"remote_path":"docs/a.txt"}"#);
        assert_eq!(
            decode_command::<CloudRequest>(&wire).unwrap(),
            CloudRequest::Fetch {
                remote_path: "docs/a.txt".into()
            }
        );
    }

    #[test]
    fn test_cloud_response_variants() {
        let ok: CloudResponse = serde_json::from_str(r#"{"status":"OK"}"#).unwrap();
        assert_eq!(
            ok,
            CloudResponse::Done {
                content_b64: None,
                sha256: None
            }
        );

        let stat: CloudResponse = serde_json::from_str(r#"{"status":"OK","sha256":"abc"}"#).unwrap();
        assert!(matches!(stat, CloudResponse::Done { sha256: Some(h), .. } if h == "abc"));

        let failed: CloudResponse =
            serde_json::from_str(r#"{"status":"ERROR","message":"no provider configured"}"#).unwrap();
        assert!(matches!(failed, CloudResponse::Failed { .. }));
    }
}
