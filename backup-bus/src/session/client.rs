//! Client role: one request, one reply, one connection.

use super::read_frame;
use crate::config::BusConfig;
use crate::frame::{Frame, FrameCodec};
use crate::utils::errors::BusError;
use futures_util::SinkExt;
use std::fmt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Two-character status the bus prefixes to every reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    /// `OK`
    Ok,
    /// `NK`: transport or transaction level failure
    NotOk,
    /// `ER`: the bus received a corrupt frame
    Corrupt,
    Unknown(String),
}

impl ReplyStatus {
    pub fn parse(code: &str) -> Self {
        match code {
            "OK" => ReplyStatus::Ok,
            "NK" => ReplyStatus::NotOk,
            "ER" => ReplyStatus::Corrupt,
            other => ReplyStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReplyStatus::Ok => "OK",
            ReplyStatus::NotOk => "NK",
            ReplyStatus::Corrupt => "ER",
            ReplyStatus::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed reply of a client transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusReply {
    pub service: String,
    pub status: ReplyStatus,
    pub content: String,
}

impl BusReply {
    /// Reply synthesized locally when the exchange itself failed.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            service: "ERROR".to_string(),
            status: ReplyStatus::NotOk,
            content: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    fn from_frame(frame: Frame) -> Self {
        let data = frame.data_lossy();
        let (status, content) = match (data.get(..2), data.get(2..)) {
            (Some(code), Some(rest)) => (ReplyStatus::parse(code), rest.to_string()),
            _ => (ReplyStatus::Unknown(data.to_string()), String::new()),
        };
        Self {
            service: frame.service().to_string(),
            status,
            content,
        }
    }
}

/// Send `data` to `service` over a fresh connection and read exactly one
/// reply. The frame is encoded before connecting, so an oversized request
/// fails without any I/O.
pub async fn try_transact(bus: &BusConfig, service: &str, data: &str) -> Result<BusReply, BusError> {
    let request = Frame::new(service, data.to_string())?;

    let stream = TcpStream::connect(bus.address()).await?;
    let mut framed = Framed::new(stream, FrameCodec::new());
    framed.send(request).await?;
    debug!(service, bytes = data.len(), "Request sent");

    let frame = read_frame(&mut framed).await?;
    let reply = BusReply::from_frame(frame);
    debug!(service = %reply.service, status = %reply.status, "Reply received");
    Ok(reply)
}

/// Like [`try_transact`], but every failure is folded into an `NK` reply.
pub async fn transact(bus: &BusConfig, service: &str, data: &str) -> BusReply {
    match try_transact(bus, service, data).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(service, error = %e, "Bus transaction failed");
            BusReply::failure(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MAX_PAYLOAD_LEN;
    use crate::utils::errors::FrameError;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn fake_bus(reply_data: &'static str) -> (BusConfig, tokio::task::JoinHandle<Frame>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, FrameCodec::new());
            let request = read_frame(&mut framed).await.unwrap();
            framed
                .send(Frame::new(request.service().to_string(), reply_data).unwrap())
                .await
                .unwrap();
            request
        });
        (BusConfig::new("127.0.0.1", port), handle)
    }

    #[tokio::test]
    async fn test_transact_parses_service_status_and_content() {
        let (bus, handle) = fake_bus("OK{\"status\":\"OK\"}").await;

        let reply = transact(&bus, "rstrv", "get_restore_plan|{\"instance_id\":3}").await;

        assert_eq!(reply.service, "rstrv");
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.content, "{\"status\":\"OK\"}");

        let request = handle.await.unwrap();
        assert_eq!(request.service(), "rstrv");
        assert_eq!(&request.data()[..], b"get_restore_plan|{\"instance_id\":3}");
    }

    #[tokio::test]
    async fn test_transact_reports_nk_and_er() {
        let (bus, _handle) = fake_bus("NKservice not registered").await;
        let reply = transact(&bus, "clcsv", "fetch|{}").await;
        assert_eq!(reply.status, ReplyStatus::NotOk);
        assert_eq!(reply.content, "service not registered");

        let (bus, _handle) = fake_bus("ER").await;
        let reply = transact(&bus, "clcsv", "fetch|{}").await;
        assert_eq!(reply.status, ReplyStatus::Corrupt);
        assert!(reply.content.is_empty());
    }

    #[tokio::test]
    async fn test_transact_connection_refused_is_nk() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let reply = transact(&BusConfig::new("127.0.0.1", port), "bkpsv", "x").await;
        assert_eq!(reply.service, "ERROR");
        assert_eq!(reply.status, ReplyStatus::NotOk);
        assert!(!reply.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_request_performs_no_io() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bus = BusConfig::new("127.0.0.1", listener.local_addr().unwrap().port());
        let data = "a".repeat(MAX_PAYLOAD_LEN);

        let result = try_transact(&bus, "bkpsv", &data).await;
        assert!(matches!(
            result,
            Err(BusError::Frame(FrameError::FrameTooLarge(_)))
        ));

        let accepted = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err(), "no connection should have been opened");
    }

    #[test]
    fn test_reply_status_roundtrip() {
        for code in ["OK", "NK", "ER", "ZZ"] {
            assert_eq!(ReplyStatus::parse(code).as_str(), code);
        }
    }
}
