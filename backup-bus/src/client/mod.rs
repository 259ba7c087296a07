//! Non-interactive drivers for the backup and restore services.

pub mod backup;
pub mod restore;

pub use backup::{BackupClient, BackupSummary};
pub use restore::{FetchedFile, RestoreClient, RestorePlan, RestoreReport};

use crate::config::BusConfig;
use crate::protocol::encode_command;
use crate::session::try_transact;
use crate::utils::errors::{ClientError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Send one typed request and decode the typed response body.
///
/// A bus status other than `OK` is reported as [`ClientError::Reply`].
pub(crate) async fn call<Req, Resp>(bus: &BusConfig, service: &str, request: &Req) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let data = encode_command(request)?;
    let reply = try_transact(bus, service, &data).await?;
    if !reply.is_ok() {
        return Err(ClientError::Reply {
            service: reply.service,
            status: reply.status.to_string(),
            content: reply.content,
        });
    }
    Ok(serde_json::from_str(&reply.content)?)
}
