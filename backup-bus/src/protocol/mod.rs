//! Command schemas carried in frame data as `<command>|<json>`.
//!
//! Requests are adjacently tagged enums (`command` + `args`) so one schema
//! per service validates the whole surface at the boundary. Responses are
//! internally tagged by their `status` field.

pub mod backup;
pub mod cloud;
pub mod restore;

use crate::utils::errors::CommandError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Catalog entry for one backed up file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub relative_path: String,
    pub hash: String,
    pub size: u64,
}

/// Parse `<command>|<json>` into a request enum tagged with `command`/`args`.
///
/// An empty JSON section is treated as `{}`.
pub fn decode_command<T: DeserializeOwned>(data: &str) -> Result<T, CommandError> {
    let (command, body) = data.split_once('|').ok_or(CommandError::Malformed)?;
    let args: Value = if body.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(body)?
    };
    serde_json::from_value(json!({ "command": command.trim(), "args": args }))
        .map_err(|e| CommandError::Invalid(e.to_string()))
}

/// Render a request enum back into `<command>|<json>`.
pub fn encode_command<T: Serialize>(request: &T) -> Result<String, CommandError> {
    let value = serde_json::to_value(request)?;
    let command = value
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::Invalid("request has no command tag".into()))?;
    let args = value.get("args").cloned().unwrap_or_else(|| json!({}));
    Ok(format!("{}|{}", command, args))
}

/// Serialize a response body, falling back to an error body if that fails.
pub fn encode_response<T: Serialize>(response: &T) -> String {
    serde_json::to_string(response)
        .unwrap_or_else(|e| error_body(&format!("response serialization failed: {}", e)))
}

/// `{"status":"ERROR","message":...}`
pub fn error_body(message: &str) -> String {
    json!({ "status": "ERROR", "message": message }).to_string()
}

/// Base64 (standard alphabet) used for `content_b64` fields.
pub fn encode_content(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_content(content_b64: &str) -> Result<Vec<u8>, CommandError> {
    STANDARD
        .decode(content_b64.trim())
        .map_err(|e| CommandError::Invalid(format!("invalid content_b64: {}", e)))
}
