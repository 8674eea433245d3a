use std::sync::Arc;
use std::time::Duration;

use duet_store::{CleanupReport, PersistentStore};
use tokio_util::sync::CancellationToken;

use crate::error::MemoryError;

/// Wait after a failed sweep before trying again.
pub(crate) const RETRY_AFTER_ERROR: Duration = Duration::from_secs(60);

/// Retention sweep loop: runs once immediately, then every `interval`.
pub(crate) async fn cleanup_loop(
    persistent: Arc<PersistentStore>,
    days_to_keep: u32,
    interval: Duration,
    offload: bool,
    cancel: CancellationToken,
) {
    let mut wait = Duration::ZERO;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Cleanup loop shutting down");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                wait = match sweep(&persistent, days_to_keep, offload).await {
                    Ok(report) => {
                        if report.total() > 0 {
                            tracing::info!(
                                market_data = report.market_data,
                                events = report.events,
                                "Cleaned up old data"
                            );
                        }
                        interval
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Cleanup sweep failed");
                        RETRY_AFTER_ERROR
                    }
                };
            }
        }
    }
}

/// One sweep, on the blocking pool when `offload` is set.
pub(crate) async fn sweep(
    persistent: &Arc<PersistentStore>,
    days_to_keep: u32,
    offload: bool,
) -> Result<CleanupReport, MemoryError> {
    if !offload {
        return Ok(persistent.cleanup_old_data(days_to_keep)?);
    }
    let store = Arc::clone(persistent);
    tokio::task::spawn_blocking(move || store.cleanup_old_data(days_to_keep))
        .await
        .map_err(|e| MemoryError::Task(e.to_string()))?
        .map_err(MemoryError::from)
}
