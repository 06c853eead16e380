//! Component J: the delivery queue and worker (§4.J). `queue_alert`
//! applies suppression → dedup → rate-limit → pending (§4.J, §8 #6-8);
//! the worker drains `pending` records at-least-once per pass, no backoff.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alert::AlertToDeliver;
use crate::error::Result;
use crate::metrics::{DeliveryLabels, Metrics};
use crate::sink::DeliverySink;
use crate::store::{DeliveryRecord, DeliveryStatus, Store};
use crate::suppression::SuppressionIndex;
use tokio::sync::Mutex;
use yuptime_crd::MatchSubject;

/// How many `pending` records a single worker tick drains.
const WORKER_BATCH_SIZE: usize = 25;
const WORKER_TICK: StdDuration = StdDuration::from_secs(5);

pub struct DeliveryQueue {
    store: Arc<dyn Store>,
    metrics: Arc<Metrics>,
}

impl DeliveryQueue {
    pub fn new(store: Arc<dyn Store>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// `queueAlert` (§4.J): suppression gate, then dedup, then rate limit,
    /// else `pending`.
    pub async fn queue_alert(
        &self,
        alert: AlertToDeliver,
        subject: &MatchSubject<'_>,
        suppression: &Mutex<SuppressionIndex>,
    ) -> Result<()> {
        let now = Utc::now();

        let suppression_result = suppression.lock().await.is_suppressed(subject, now);
        if suppression_result.suppressed {
            self.insert(&alert, DeliveryStatus::Deduped, suppression_result.reason, now)
                .await?;
            return Ok(());
        }

        if alert.dedup_window_minutes > 0 {
            let since = now - Duration::minutes(alert.dedup_window_minutes as i64);
            let hits = self
                .store
                .sent_deliveries_by_dedup_key(&alert.dedup_key, since)
                .await?;
            if !hits.is_empty() {
                self.insert(
                    &alert,
                    DeliveryStatus::Deduped,
                    Some("duplicate_in_window".to_string()),
                    now,
                )
                .await?;
                return Ok(());
            }
        }

        if alert.rate_limit_min_minutes > 0 {
            let since = now - Duration::minutes(alert.rate_limit_min_minutes as i64);
            let hits = self
                .store
                .sent_deliveries_by_monitor_policy(&alert.monitor_id, &alert.policy_name, since)
                .await?;
            if !hits.is_empty() {
                self.insert(&alert, DeliveryStatus::Deduped, Some("rate_limited".to_string()), now)
                    .await?;
                return Ok(());
            }
        }

        self.insert(&alert, DeliveryStatus::Pending, None, now).await
    }

    async fn insert(
        &self,
        alert: &AlertToDeliver,
        status: DeliveryStatus,
        reason: Option<String>,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        if status == DeliveryStatus::Deduped {
            self.metrics
                .alerts
                .deliveries
                .get_or_create(&DeliveryLabels {
                    status: "deduped".to_string(),
                })
                .inc();
        }
        self.store
            .insert_delivery(DeliveryRecord {
                id: Uuid::new_v4(),
                incident_id: alert.incident_id,
                monitor_id: alert.monitor_id.clone(),
                policy_name: alert.policy_name.clone(),
                provider_name: alert.provider_name.clone(),
                provider_type: alert.provider_type.clone(),
                dedup_key: alert.dedup_key.clone(),
                status,
                attempts: 0,
                title: alert.title.clone(),
                body: alert.body.clone(),
                reason,
                created_at: now,
                last_attempt_at: None,
                last_error: None,
                sent_at: None,
            })
            .await
    }
}

/// Background worker loop (§4.J "Worker"). Runs until `shutdown` resolves.
pub async fn run_worker(
    store: Arc<dyn Store>,
    sink: Arc<dyn DeliverySink>,
    metrics: Arc<Metrics>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(WORKER_TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("delivery worker shutting down");
                    return;
                }
            }
        }

        let pending = match store.pending_deliveries(WORKER_BATCH_SIZE).await {
            Ok(records) => records,
            Err(e) => {
                error!(%e, "failed to list pending deliveries");
                continue;
            }
        };

        for record in pending {
            let now = Utc::now();
            // A single delivery's failure must not poison the loop (§4.J).
            match sink.deliver(&record.provider_name, &record.title, &record.body).await {
                Ok(_) => {
                    if let Err(e) = store
                        .update_delivery_status(record.id, DeliveryStatus::Sent, None, now)
                        .await
                    {
                        error!(%e, delivery = %record.id, "failed to mark delivery sent");
                        continue;
                    }
                    metrics
                        .alerts
                        .deliveries
                        .get_or_create(&DeliveryLabels {
                            status: "sent".to_string(),
                        })
                        .inc();
                }
                Err(e) => {
                    warn!(delivery = %record.id, error = %e, "delivery failed");
                    if let Err(e) = store
                        .update_delivery_status(record.id, DeliveryStatus::Failed, Some(e.to_string()), now)
                        .await
                    {
                        error!(%e, delivery = %record.id, "failed to mark delivery failed");
                    }
                    metrics
                        .alerts
                        .deliveries
                        .get_or_create(&DeliveryLabels {
                            status: "failed".to_string(),
                        })
                        .inc();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DeliveryOutcome;
    use crate::store::memory::MemoryStore;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert(dedup_key: &str, dedup_window: u32, rate_limit: u32) -> AlertToDeliver {
        AlertToDeliver {
            policy_name: "p1".into(),
            provider_name: "prov1".into(),
            provider_type: "webhook".into(),
            monitor_id: "default/m1".into(),
            incident_id: None,
            dedup_key: dedup_key.into(),
            title: "down: m1".into(),
            body: "body".into(),
            dedup_window_minutes: dedup_window,
            rate_limit_min_minutes: rate_limit,
        }
    }

    #[tokio::test]
    async fn suppressed_monitor_is_deduped_not_delivered() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::default());
        let queue = DeliveryQueue::new(store.clone(), metrics);
        let mut index = SuppressionIndex::new();
        index.upsert_silence(
            crate::cache::ObjectKey::new(crate::cache::Kind::Silence, "default", "s1"),
            crate::suppression::SilenceEntry {
                expires_at: Utc::now() + Duration::hours(1),
                selector: yuptime_crd::Selector::default(),
                reason: Some("planned".into()),
            },
        );
        let suppression = Mutex::new(index);
        let labels = BTreeMap::new();
        let subject = MatchSubject {
            namespace: "default",
            name: "m1",
            labels: &labels,
            tags: &[],
        };
        queue
            .queue_alert(alert("k1", 0, 0), &subject, &suppression)
            .await
            .unwrap();
        let pending = store.pending_deliveries(10).await.unwrap();
        assert!(pending.is_empty());
    }

    struct FakeSink {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DeliverySink for FakeSink {
        async fn deliver(&self, _provider: &str, _title: &str, _body: &str) -> crate::error::Result<DeliveryOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryOutcome { sent_at: Utc::now() })
        }
    }

    #[tokio::test]
    async fn worker_drains_one_pending_record() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let metrics = Arc::new(Metrics::default());
        let queue = DeliveryQueue::new(store.clone(), metrics.clone());
        let suppression = Mutex::new(SuppressionIndex::new());
        let labels = BTreeMap::new();
        let subject = MatchSubject {
            namespace: "default",
            name: "m1",
            labels: &labels,
            tags: &[],
        };
        queue
            .queue_alert(alert("k1", 0, 0), &subject, &suppression)
            .await
            .unwrap();

        let sink = Arc::new(FakeSink {
            calls: AtomicUsize::new(0),
        });
        let pending = store.pending_deliveries(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        for record in pending {
            sink.deliver(&record.provider_name, &record.title, &record.body)
                .await
                .unwrap();
            store
                .update_delivery_status(record.id, DeliveryStatus::Sent, None, Utc::now())
                .await
                .unwrap();
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(store.pending_deliveries(10).await.unwrap().is_empty());
    }
}
