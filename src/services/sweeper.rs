use {
    super::settlement::Settlement,
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically fail pending payments whose checkout references have gone
/// stale. Retrying clients get a fresh payment row instead.
pub async fn run_sweeper(
    settlement: Arc<Settlement>,
    ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(ttl_secs = ttl.as_secs(), "stale payment sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("stale payment sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
        }

        match settlement.expire_stale_payments(ttl).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "expired stale pending payments"),
            Err(e) => tracing::error!(error = %e, "stale payment sweep failed"),
        }
    }
}
