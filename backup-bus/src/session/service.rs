//! Service role: register once, then serve sequential requests.

use super::{read_frame, RequestHandler};
use crate::config::BusConfig;
use crate::frame::{Frame, FrameCodec, REGISTRATION_TARGET};
use crate::utils::errors::{BusError, FrameError};
use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One persistent bus connection owned by a single service.
pub struct ServiceSession<S = TcpStream> {
    name: String,
    framed: Framed<S, FrameCodec>,
}

impl ServiceSession<TcpStream> {
    /// Open a TCP connection to the bus.
    pub async fn connect(bus: &BusConfig, name: &str) -> Result<Self, BusError> {
        let stream = TcpStream::connect(bus.address()).await?;
        info!("Connected to bus at {}", bus.address());
        Self::from_stream(stream, name)
    }
}

impl<S> ServiceSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn from_stream(stream: S, name: &str) -> Result<Self, BusError> {
        // Validates the name against the service field width
        Frame::new(name, "")?;
        Ok(Self {
            name: name.to_string(),
            framed: Framed::new(stream, FrameCodec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Announce this service's name to the bus.
    pub async fn register(&mut self) -> Result<(), BusError> {
        let request = Frame::new(REGISTRATION_TARGET, self.name.clone())?;
        self.framed.send(request).await?;

        let reply = read_frame(&mut self.framed).await?;
        let ack = reply.data_lossy();
        // The bus acks with free-form text; only the presence of "OK" is
        // guaranteed. A failure text containing "OK" would pass this check.
        if !ack.contains("OK") {
            return Err(BusError::RegistrationFailed(ack.into_owned()));
        }

        info!("Service '{}' registered", self.name);
        Ok(())
    }

    /// Serve requests until the bus closes the connection.
    ///
    /// Returns `Ok(())` on a clean close and an error for anything that
    /// leaves the connection unusable.
    pub async fn serve<H>(&mut self, handler: &H) -> Result<(), BusError>
    where
        H: RequestHandler + ?Sized,
    {
        self.serve_until(handler, &CancellationToken::new()).await
    }

    /// Like [`serve`](Self::serve), but also returns once `shutdown` fires.
    ///
    /// Cancellation is only observed while waiting for the next request; a
    /// request already read is handled and answered first.
    pub async fn serve_until<H>(&mut self, handler: &H, shutdown: &CancellationToken) -> Result<(), BusError>
    where
        H: RequestHandler + ?Sized,
    {
        loop {
            let next = tokio::select! {
                next = read_frame(&mut self.framed) => next,
                _ = shutdown.cancelled() => {
                    info!("Service '{}' stops serving", self.name);
                    return Ok(());
                }
            };

            // The leading field is an address tag; only the data matters here.
            let request = match next {
                Ok(frame) => frame.data_lossy().into_owned(),
                Err(e) if e.is_connection_closed() => {
                    info!("Bus closed the connection for '{}'", self.name);
                    return Ok(());
                }
                // Still answered, so the caller is never left waiting
                Err(BusError::Frame(FrameError::MissingServiceField(len))) => {
                    warn!("{} byte payload has no service field; handling it as empty", len);
                    String::new()
                }
                Err(e) => return Err(e),
            };
            debug!(service = %self.name, bytes = request.len(), "Request received");

            let response = handler.handle(&request).await;

            let reply = match Frame::new(self.name.clone(), response.clone()) {
                Ok(reply) => reply,
                Err(e) => {
                    error!(service = %self.name, error = %e, "Response cannot be framed");
                    Frame::new(self.name.clone(), handler.error_response(&e.to_string()))?
                }
            };

            if let Err(e) = self.framed.send(reply).await {
                warn!(service = %self.name, error = %e, "Failed to deliver response");
                handler.undelivered(&request, &response).await;
                return Err(e.into());
            }
            debug!(service = %self.name, bytes = response.len(), "Response sent");
        }
    }
}
