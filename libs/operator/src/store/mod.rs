//! Pluggable persistence (§6: "embedded kv/sqlite or a server database;
//! schema is isomorphic"). [`Store`] is the contract; [`memory`] and
//! [`sqlite`] are the two shipped implementations.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub type IncidentId = Uuid;
pub type DeliveryId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Up,
    Down,
    Pending,
    Flapping,
    Paused,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Heartbeat {
    pub monitor_id: String,
    pub state: MonitorState,
    pub latency_ms: f64,
    pub reason: String,
    pub message: String,
    pub checked_at: DateTime<Utc>,
    pub attempts: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub monitor_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<i64>,
    pub suppressed: bool,
    pub acknowledged: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Deduped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub incident_id: Option<IncidentId>,
    pub monitor_id: String,
    pub policy_name: String,
    pub provider_name: String,
    pub provider_type: String,
    pub dedup_key: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub title: String,
    pub body: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Contract: insert, update-by-id, query by equality + time range +
/// limit/order (§6). Kept as narrow typed methods rather than a generic
/// query builder -- the operator only ever needs the access patterns below.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_heartbeat(&self, heartbeat: Heartbeat) -> Result<()>;
    async fn last_heartbeat(&self, monitor_id: &str) -> Result<Option<Heartbeat>>;
    /// The most recent `limit` heartbeats for `monitor_id`, oldest first
    /// (flapping-window classification, §4.B `flappingWindowChecks`).
    async fn recent_heartbeats(&self, monitor_id: &str, limit: usize) -> Result<Vec<Heartbeat>>;

    async fn open_incident(&self, incident: Incident) -> Result<()>;
    async fn close_incident(
        &self,
        monitor_id: &str,
        ended_at: DateTime<Utc>,
        duration_sec: i64,
    ) -> Result<()>;
    async fn open_incident_for(&self, monitor_id: &str) -> Result<Option<Incident>>;

    async fn insert_delivery(&self, record: DeliveryRecord) -> Result<()>;
    async fn update_delivery_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        last_error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()>;
    async fn pending_deliveries(&self, limit: usize) -> Result<Vec<DeliveryRecord>>;
    /// Sent deliveries with the given `dedup_key` at or after `since` (dedup check, §4.J).
    async fn sent_deliveries_by_dedup_key(
        &self,
        dedup_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>>;
    /// Sent deliveries for `(monitor_id, policy_name)` at or after `since` (rate limit, §4.J).
    async fn sent_deliveries_by_monitor_policy(
        &self,
        monitor_id: &str,
        policy_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>>;

    /// Drops heartbeats and closed incidents older than `cutoff`, and
    /// deliveries in a terminal state (`sent`/`failed`/`deduped`) created
    /// before `cutoff` (§4.B `retentionDays`). Open incidents and pending
    /// deliveries are never purged regardless of age.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<()>;
}
