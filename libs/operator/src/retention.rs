//! Retention sweep (§4.B `YuptimeSettings.retentionDays`). Periodically
//! purges heartbeats, closed incidents and terminal deliveries older than
//! the cluster's configured retention window. Mirrors the delivery
//! worker's shape: a ticking background loop the binary spawns once.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{error, info};

use crate::context::OperatorContext;

const SWEEP_TICK: StdDuration = StdDuration::from_secs(3600);

/// Runs until `shutdown` resolves, purging once per tick against the
/// `retentionDays` value live in `ctx.settings` at sweep time.
pub async fn run_worker(ctx: Arc<OperatorContext>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(SWEEP_TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("retention worker shutting down");
                    return;
                }
            }
        }

        let retention_days = ctx.settings.read().await.retention_days;
        if retention_days == 0 {
            continue;
        }
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        if let Err(e) = ctx.store.purge_older_than(cutoff).await {
            error!(%e, "retention sweep failed");
        }
    }
}
