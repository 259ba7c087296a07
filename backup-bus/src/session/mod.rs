//! Bus sessions built on the frame codec.
//!
//! - [`ServiceSession`]: long-lived connection that registers a service name
//!   once and then serves requests strictly one at a time.
//! - [`transact`]: one-shot client exchange (connect, send, read one reply,
//!   close).
//! - [`supervisor`]: reconnect policy wrapped around a service session.

pub mod client;
pub mod service;
pub mod supervisor;

pub use client::{transact, try_transact, BusReply, ReplyStatus};
pub use service::ServiceSession;
pub use supervisor::{run_service, RestartPolicy};

use crate::frame::{Frame, FrameCodec};
use crate::utils::errors::{BusError, FrameError};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

/// Business logic behind a registered service name.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle the data section of one request and produce the response data.
    async fn handle(&self, request: &str) -> String;

    /// Response sent instead of one that could not be framed.
    fn error_response(&self, message: &str) -> String {
        message.to_string()
    }

    /// Called when `response` to `request` could not be written back because
    /// the connection went away.
    async fn undelivered(&self, _request: &str, _response: &str) {}
}

/// Read the next frame, mapping a clean end of stream to `ConnectionClosed`.
pub(crate) async fn read_frame<S>(framed: &mut Framed<S, FrameCodec>) -> Result<Frame, BusError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(Ok(payload)) => Ok(Frame::from_payload(payload)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(BusError::Frame(FrameError::ConnectionClosed)),
    }
}
