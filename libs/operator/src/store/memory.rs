//! Default, in-process [`Store`] -- used by tests and single-replica dev mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{DeliveryId, DeliveryRecord, DeliveryStatus, Heartbeat, Incident, Store};
use crate::error::Result;

#[derive(Default)]
struct Inner {
    heartbeats: HashMap<String, Vec<Heartbeat>>,
    incidents: HashMap<String, Vec<Incident>>,
    deliveries: HashMap<DeliveryId, DeliveryRecord>,
    delivery_order: Vec<DeliveryId>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_heartbeat(&self, heartbeat: Heartbeat) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .heartbeats
            .entry(heartbeat.monitor_id.clone())
            .or_default()
            .push(heartbeat);
        Ok(())
    }

    async fn last_heartbeat(&self, monitor_id: &str) -> Result<Option<Heartbeat>> {
        Ok(self
            .inner
            .read()
            .await
            .heartbeats
            .get(monitor_id)
            .and_then(|v| v.last().cloned()))
    }

    async fn recent_heartbeats(&self, monitor_id: &str, limit: usize) -> Result<Vec<Heartbeat>> {
        let inner = self.inner.read().await;
        Ok(inner
            .heartbeats
            .get(monitor_id)
            .map(|v| {
                let start = v.len().saturating_sub(limit);
                v[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn open_incident(&self, incident: Incident) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .incidents
            .entry(incident.monitor_id.clone())
            .or_default()
            .push(incident);
        Ok(())
    }

    async fn close_incident(
        &self,
        monitor_id: &str,
        ended_at: DateTime<Utc>,
        duration_sec: i64,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(incidents) = inner.incidents.get_mut(monitor_id) {
            if let Some(open) = incidents.iter_mut().find(|i| i.ended_at.is_none()) {
                open.ended_at = Some(ended_at);
                open.duration_sec = Some(duration_sec);
            }
        }
        Ok(())
    }

    async fn open_incident_for(&self, monitor_id: &str) -> Result<Option<Incident>> {
        Ok(self
            .inner
            .read()
            .await
            .incidents
            .get(monitor_id)
            .and_then(|incidents| incidents.iter().find(|i| i.ended_at.is_none()).cloned()))
    }

    async fn insert_delivery(&self, record: DeliveryRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.delivery_order.push(record.id);
        inner.deliveries.insert(record.id, record);
        Ok(())
    }

    async fn update_delivery_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        last_error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.deliveries.get_mut(&id) {
            record.attempts += 1;
            record.last_attempt_at = Some(at);
            match status {
                DeliveryStatus::Sent => record.sent_at = Some(at),
                DeliveryStatus::Failed => record.last_error = last_error,
                _ => {}
            }
            record.status = status;
        }
        Ok(())
    }

    async fn pending_deliveries(&self, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .delivery_order
            .iter()
            .filter_map(|id| inner.deliveries.get(id))
            .filter(|d| d.status == DeliveryStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn sent_deliveries_by_dedup_key(
        &self,
        dedup_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .deliveries
            .values()
            .filter(|d| {
                d.dedup_key == dedup_key
                    && d.status == DeliveryStatus::Sent
                    && d.sent_at.map(|t| t >= since).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn sent_deliveries_by_monitor_policy(
        &self,
        monitor_id: &str,
        policy_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .deliveries
            .values()
            .filter(|d| {
                d.monitor_id == monitor_id
                    && d.policy_name == policy_name
                    && d.status == DeliveryStatus::Sent
                    && d.sent_at.map(|t| t >= since).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for heartbeats in inner.heartbeats.values_mut() {
            heartbeats.retain(|h| h.checked_at >= cutoff);
        }
        for incidents in inner.incidents.values_mut() {
            incidents.retain(|i| i.ended_at.map(|ended| ended >= cutoff).unwrap_or(true));
        }
        let deliveries = &mut inner.deliveries;
        inner.delivery_order.retain(|id| match deliveries.get(id) {
            Some(d) if d.status != DeliveryStatus::Pending && d.created_at < cutoff => {
                deliveries.remove(id);
                false
            }
            Some(_) => true,
            None => false,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn delivery(monitor_id: &str, policy: &str, dedup_key: &str) -> DeliveryRecord {
        DeliveryRecord {
            id: uuid::Uuid::new_v4(),
            incident_id: None,
            monitor_id: monitor_id.into(),
            policy_name: policy.into(),
            provider_name: "p".into(),
            provider_type: "webhook".into(),
            dedup_key: dedup_key.into(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            title: "t".into(),
            body: "b".into(),
            reason: None,
            created_at: Utc::now(),
            last_attempt_at: None,
            last_error: None,
            sent_at: None,
        }
    }

    #[tokio::test]
    async fn incident_open_then_close_roundtrips() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .open_incident(Incident {
                id: uuid::Uuid::new_v4(),
                monitor_id: "default/m1".into(),
                started_at: now,
                ended_at: None,
                duration_sec: None,
                suppressed: false,
                acknowledged: false,
            })
            .await
            .unwrap();
        assert!(store.open_incident_for("default/m1").await.unwrap().is_some());
        store
            .close_incident("default/m1", now + Duration::seconds(30), 30)
            .await
            .unwrap();
        assert!(store.open_incident_for("default/m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_deliveries_only_returns_pending() {
        let store = MemoryStore::new();
        let mut d = delivery("default/m1", "p1", "k1");
        d.status = DeliveryStatus::Deduped;
        store.insert_delivery(d).await.unwrap();
        store
            .insert_delivery(delivery("default/m1", "p1", "k2"))
            .await
            .unwrap();
        let pending = store.pending_deliveries(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dedup_key, "k2");
    }

    #[tokio::test]
    async fn dedup_lookup_respects_window() {
        let store = MemoryStore::new();
        let mut d = delivery("default/m1", "p1", "k1");
        d.status = DeliveryStatus::Sent;
        d.sent_at = Some(Utc::now() - Duration::minutes(10));
        store.insert_delivery(d).await.unwrap();
        let hits = store
            .sent_deliveries_by_dedup_key("k1", Utc::now() - Duration::minutes(5))
            .await
            .unwrap();
        assert!(hits.is_empty());
        let hits = store
            .sent_deliveries_by_dedup_key("k1", Utc::now() - Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn purge_drops_old_heartbeats_closed_incidents_and_terminal_deliveries() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(30);
        let recent = Utc::now();

        store
            .insert_heartbeat(Heartbeat {
                monitor_id: "default/m1".into(),
                state: MonitorState::Up,
                latency_ms: 1.0,
                reason: "ok".into(),
                message: "ok".into(),
                checked_at: old,
                attempts: 1,
            })
            .await
            .unwrap();
        store
            .insert_heartbeat(Heartbeat {
                monitor_id: "default/m1".into(),
                state: MonitorState::Up,
                latency_ms: 1.0,
                reason: "ok".into(),
                message: "ok".into(),
                checked_at: recent,
                attempts: 1,
            })
            .await
            .unwrap();

        store
            .open_incident(Incident {
                id: uuid::Uuid::new_v4(),
                monitor_id: "default/m1".into(),
                started_at: old,
                ended_at: None,
                duration_sec: None,
                suppressed: false,
                acknowledged: false,
            })
            .await
            .unwrap();
        store.close_incident("default/m1", old, 10).await.unwrap();

        let mut sent = delivery("default/m1", "p1", "k1");
        sent.status = DeliveryStatus::Sent;
        sent.created_at = old;
        store.insert_delivery(sent).await.unwrap();
        store
            .insert_delivery(delivery("default/m1", "p1", "k2"))
            .await
            .unwrap();

        let cutoff = Utc::now() - Duration::days(1);
        store.purge_older_than(cutoff).await.unwrap();

        let remaining = store.recent_heartbeats("default/m1", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].checked_at, recent);
        assert!(store
            .inner
            .read()
            .await
            .incidents
            .get("default/m1")
            .map(|v| v.is_empty())
            .unwrap_or(true));
        let pending = store.pending_deliveries(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dedup_key, "k2");
    }
}
