//! Supervised restart of a service session.
//!
//! Keeps reconnecting, registering and serving until cancelled. Failures back
//! off exponentially; a clean close by the bus resets the backoff. A request
//! in progress when the token fires is still handled and answered.

use super::{RequestHandler, ServiceSession};
use crate::config::BusConfig;
use crate::utils::errors::BusError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed sessions tolerated before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RestartPolicy {
    pub fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(30_000),
            max_attempts: None,
        }
    }
}

/// Run `handler` as service `name` on the bus until `shutdown` fires or the
/// restart policy is exhausted.
pub async fn run_service<H>(
    bus: BusConfig,
    name: String,
    handler: Arc<H>,
    policy: RestartPolicy,
    shutdown: CancellationToken,
) -> Result<(), BusError>
where
    H: RequestHandler + ?Sized,
{
    let mut backoff = policy.initial_backoff;
    let mut failures: u32 = 0;

    info!("Starting service '{}'", name);

    loop {
        if shutdown.is_cancelled() {
            info!("Service '{}' shutting down", name);
            return Ok(());
        }

        let outcome = run_session(&bus, &name, handler.as_ref(), &shutdown).await;
        if shutdown.is_cancelled() {
            info!("Service '{}' shutting down", name);
            return Ok(());
        }

        match outcome {
            Ok(()) => {
                backoff = policy.initial_backoff;
                failures = 0;
            }
            Err(e) => {
                failures += 1;
                warn!(service = %name, attempt = failures, error = %e, "Bus session failed");
                if policy.max_attempts.is_some_and(|max| failures >= max) {
                    error!(service = %name, "Giving up after {} failed sessions", failures);
                    return Err(e);
                }
            }
        }

        info!("Reconnecting '{}' in {}ms...", name, backoff.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.cancelled() => return Ok(()),
        }
        backoff = policy.next_backoff(backoff);
    }
}

async fn run_session<H>(
    bus: &BusConfig,
    name: &str,
    handler: &H,
    shutdown: &CancellationToken,
) -> Result<(), BusError>
where
    H: RequestHandler + ?Sized,
{
    let mut session = tokio::select! {
        session = open_session(bus, name) => session?,
        _ = shutdown.cancelled() => return Ok(()),
    };
    session.serve_until(handler, shutdown).await
}

async fn open_session(bus: &BusConfig, name: &str) -> Result<ServiceSession, BusError> {
    let mut session = ServiceSession::connect(bus, name).await?;
    session.register().await?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameCodec};
    use crate::session::read_frame;
    use async_trait::async_trait;
    use futures_util::SinkExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::net::TcpListener;
    use tokio::sync::Notify;
    use tokio_util::codec::Framed;

    struct Upper;

    #[async_trait]
    impl RequestHandler for Upper {
        async fn handle(&self, request: &str) -> String {
            request.to_uppercase()
        }
    }

    fn fast_policy(max_attempts: Option<u32>) -> RestartPolicy {
        RestartPolicy {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RestartPolicy::default();
        let mut backoff = policy.initial_backoff;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(backoff.as_millis());
            backoff = policy.next_backoff(backoff);
        }
        assert_eq!(seen, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = run_service(
            BusConfig::new("127.0.0.1", port),
            "bkpsv".to_string(),
            Arc::new(Upper),
            fast_policy(Some(3)),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(BusError::Transport(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = run_service(
            BusConfig::new("127.0.0.1", 1),
            "bkpsv".to_string(),
            Arc::new(Upper),
            fast_policy(None),
            shutdown,
        )
        .await;

        assert!(result.is_ok());
    }

    /// Signals when a request arrives, then takes a while to answer it.
    struct Slow {
        started: Notify,
        finished: AtomicBool,
    }

    #[async_trait]
    impl RequestHandler for Slow {
        async fn handle(&self, request: &str) -> String {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.finished.store(true, Ordering::SeqCst);
            format!("done:{}", request)
        }
    }

    #[tokio::test]
    async fn test_shutdown_lets_request_in_progress_finish() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bus = BusConfig::new("127.0.0.1", listener.local_addr().unwrap().port());
        let shutdown = CancellationToken::new();
        let handler = Arc::new(Slow {
            started: Notify::new(),
            finished: AtomicBool::new(false),
        });

        let supervisor = tokio::spawn(run_service(
            bus,
            "slow".to_string(),
            handler.clone(),
            fast_policy(None),
            shutdown.clone(),
        ));

        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec::new());
        read_frame(&mut framed).await.unwrap();
        framed.send(Frame::new("sinit", "OK").unwrap()).await.unwrap();
        framed.send(Frame::new("slow", "upload").unwrap()).await.unwrap();

        handler.started.notified().await;
        shutdown.cancel();

        let reply = read_frame(&mut framed).await.unwrap();
        assert_eq!(reply.data_lossy(), "done:upload");
        assert!(supervisor.await.unwrap().is_ok());
        assert!(handler.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reconnects_after_bus_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bus = BusConfig::new("127.0.0.1", listener.local_addr().unwrap().port());
        let shutdown = CancellationToken::new();

        let supervisor = tokio::spawn(run_service(
            bus,
            "upper".to_string(),
            Arc::new(Upper),
            fast_policy(None),
            shutdown.clone(),
        ));

        // Two separate connections, each registering and serving one request
        for word in ["first", "second"] {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, FrameCodec::new());

            let register = read_frame(&mut framed).await.unwrap();
            assert_eq!(register.service(), "sinit");
            framed.send(Frame::new("sinit", "OK").unwrap()).await.unwrap();

            framed.send(Frame::new("upper", word).unwrap()).await.unwrap();
            let reply = read_frame(&mut framed).await.unwrap();
            assert_eq!(reply.data_lossy(), word.to_uppercase());
        }

        shutdown.cancel();
        assert!(supervisor.await.unwrap().is_ok());
    }
}
