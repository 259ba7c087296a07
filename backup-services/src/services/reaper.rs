use crate::coordinator::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Periodically roll back transactions older than `ttl`.
pub fn start_reaper(
    coordinator: Arc<Coordinator>,
    ttl: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let reaped = coordinator.reap_expired(ttl).await;
                    if reaped > 0 {
                        tracing::warn!("Reaped {} abandoned transaction(s)", reaped);
                    }
                }
            }
        }
        tracing::info!("Transaction reaper stopped");
    })
}
