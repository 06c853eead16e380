//! `sqlx`-backed [`Store`], the "embedded sqlite" option named in §6.
//! Schema is isomorphic to [`super::memory::MemoryStore`]'s in-process model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};

use super::{
    DeliveryId, DeliveryRecord, DeliveryStatus, Heartbeat, Incident, MonitorState, Store,
};
use crate::error::{Error, Result};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS heartbeats (
                monitor_id TEXT NOT NULL,
                state TEXT NOT NULL,
                latency_ms REAL NOT NULL,
                reason TEXT NOT NULL,
                message TEXT NOT NULL,
                checked_at TEXT NOT NULL,
                attempts INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_sec INTEGER,
                suppressed INTEGER NOT NULL,
                acknowledged INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS deliveries (
                id TEXT PRIMARY KEY,
                incident_id TEXT,
                monitor_id TEXT NOT NULL,
                policy_name TEXT NOT NULL,
                provider_name TEXT NOT NULL,
                provider_type TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                reason TEXT,
                created_at TEXT NOT NULL,
                last_attempt_at TEXT,
                last_error TEXT,
                sent_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }
}

fn parse_state(s: &str) -> MonitorState {
    match s {
        "up" => MonitorState::Up,
        "down" => MonitorState::Down,
        "flapping" => MonitorState::Flapping,
        "paused" => MonitorState::Paused,
        _ => MonitorState::Pending,
    }
}

fn state_str(s: MonitorState) -> &'static str {
    match s {
        MonitorState::Up => "up",
        MonitorState::Down => "down",
        MonitorState::Pending => "pending",
        MonitorState::Flapping => "flapping",
        MonitorState::Paused => "paused",
    }
}

fn parse_status(s: &str) -> DeliveryStatus {
    match s {
        "sent" => DeliveryStatus::Sent,
        "failed" => DeliveryStatus::Failed,
        "deduped" => DeliveryStatus::Deduped,
        _ => DeliveryStatus::Pending,
    }
}

fn status_str(s: DeliveryStatus) -> &'static str {
    match s {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Sent => "sent",
        DeliveryStatus::Failed => "failed",
        DeliveryStatus::Deduped => "deduped",
    }
}

#[derive(FromRow)]
struct DeliveryRow {
    id: String,
    incident_id: Option<String>,
    monitor_id: String,
    policy_name: String,
    provider_name: String,
    provider_type: String,
    dedup_key: String,
    status: String,
    attempts: i64,
    title: String,
    body: String,
    reason: Option<String>,
    created_at: String,
    last_attempt_at: Option<String>,
    last_error: Option<String>,
    sent_at: Option<String>,
}

impl DeliveryRow {
    fn into_record(self) -> Result<DeliveryRecord> {
        Ok(DeliveryRecord {
            id: self.id.parse().map_err(|_| Error::Store("bad delivery id".into()))?,
            incident_id: self
                .incident_id
                .map(|s| s.parse())
                .transpose()
                .map_err(|_| Error::Store("bad incident id".into()))?,
            monitor_id: self.monitor_id,
            policy_name: self.policy_name,
            provider_name: self.provider_name,
            provider_type: self.provider_type,
            dedup_key: self.dedup_key,
            status: parse_status(&self.status),
            attempts: self.attempts as u32,
            title: self.title,
            body: self.body,
            reason: self.reason,
            created_at: parse_ts(&self.created_at)?,
            last_attempt_at: self.last_attempt_at.map(|s| parse_ts(&s)).transpose()?,
            last_error: self.last_error,
            sent_at: self.sent_at.map(|s| parse_ts(&s)).transpose()?,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("bad timestamp {s}: {e}")))
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_heartbeat(&self, heartbeat: Heartbeat) -> Result<()> {
        sqlx::query(
            "INSERT INTO heartbeats (monitor_id, state, latency_ms, reason, message, checked_at, attempts) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&heartbeat.monitor_id)
        .bind(state_str(heartbeat.state))
        .bind(heartbeat.latency_ms)
        .bind(&heartbeat.reason)
        .bind(&heartbeat.message)
        .bind(heartbeat.checked_at.to_rfc3339())
        .bind(heartbeat.attempts as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn last_heartbeat(&self, monitor_id: &str) -> Result<Option<Heartbeat>> {
        let row = sqlx::query(
            "SELECT state, latency_ms, reason, message, checked_at, attempts FROM heartbeats WHERE monitor_id = ? ORDER BY checked_at DESC LIMIT 1",
        )
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        match row {
            None => Ok(None),
            Some(row) => {
                let checked_at: String = row.try_get("checked_at").map_err(|e| Error::Store(e.to_string()))?;
                Ok(Some(Heartbeat {
                    monitor_id: monitor_id.to_string(),
                    state: parse_state(row.try_get::<String, _>("state").map_err(|e| Error::Store(e.to_string()))?.as_str()),
                    latency_ms: row.try_get("latency_ms").map_err(|e| Error::Store(e.to_string()))?,
                    reason: row.try_get("reason").map_err(|e| Error::Store(e.to_string()))?,
                    message: row.try_get("message").map_err(|e| Error::Store(e.to_string()))?,
                    checked_at: parse_ts(&checked_at)?,
                    attempts: row.try_get::<i64, _>("attempts").map_err(|e| Error::Store(e.to_string()))? as u32,
                }))
            }
        }
    }

    async fn recent_heartbeats(&self, monitor_id: &str, limit: usize) -> Result<Vec<Heartbeat>> {
        let rows = sqlx::query(
            "SELECT state, latency_ms, reason, message, checked_at, attempts FROM heartbeats WHERE monitor_id = ? ORDER BY checked_at DESC LIMIT ?",
        )
        .bind(monitor_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        let mut heartbeats = Vec::with_capacity(rows.len());
        for row in rows {
            let checked_at: String = row.try_get("checked_at").map_err(|e| Error::Store(e.to_string()))?;
            heartbeats.push(Heartbeat {
                monitor_id: monitor_id.to_string(),
                state: parse_state(row.try_get::<String, _>("state").map_err(|e| Error::Store(e.to_string()))?.as_str()),
                latency_ms: row.try_get("latency_ms").map_err(|e| Error::Store(e.to_string()))?,
                reason: row.try_get("reason").map_err(|e| Error::Store(e.to_string()))?,
                message: row.try_get("message").map_err(|e| Error::Store(e.to_string()))?,
                checked_at: parse_ts(&checked_at)?,
                attempts: row.try_get::<i64, _>("attempts").map_err(|e| Error::Store(e.to_string()))? as u32,
            });
        }
        // Oldest first, matching the `Store::recent_heartbeats` contract.
        heartbeats.reverse();
        Ok(heartbeats)
    }

    async fn open_incident(&self, incident: Incident) -> Result<()> {
        sqlx::query(
            "INSERT INTO incidents (id, monitor_id, started_at, ended_at, duration_sec, suppressed, acknowledged) VALUES (?, ?, ?, NULL, NULL, ?, ?)",
        )
        .bind(incident.id.to_string())
        .bind(&incident.monitor_id)
        .bind(incident.started_at.to_rfc3339())
        .bind(incident.suppressed)
        .bind(incident.acknowledged)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn close_incident(
        &self,
        monitor_id: &str,
        ended_at: DateTime<Utc>,
        duration_sec: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE incidents SET ended_at = ?, duration_sec = ? WHERE monitor_id = ? AND ended_at IS NULL",
        )
        .bind(ended_at.to_rfc3339())
        .bind(duration_sec)
        .bind(monitor_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn open_incident_for(&self, monitor_id: &str) -> Result<Option<Incident>> {
        let row = sqlx::query(
            "SELECT id, started_at, suppressed, acknowledged FROM incidents WHERE monitor_id = ? AND ended_at IS NULL LIMIT 1",
        )
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        match row {
            None => Ok(None),
            Some(row) => {
                let id: String = row.try_get("id").map_err(|e| Error::Store(e.to_string()))?;
                let started_at: String = row.try_get("started_at").map_err(|e| Error::Store(e.to_string()))?;
                Ok(Some(Incident {
                    id: id.parse().map_err(|_| Error::Store("bad incident id".into()))?,
                    monitor_id: monitor_id.to_string(),
                    started_at: parse_ts(&started_at)?,
                    ended_at: None,
                    duration_sec: None,
                    suppressed: row.try_get("suppressed").map_err(|e| Error::Store(e.to_string()))?,
                    acknowledged: row.try_get("acknowledged").map_err(|e| Error::Store(e.to_string()))?,
                }))
            }
        }
    }

    async fn insert_delivery(&self, record: DeliveryRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO deliveries (id, incident_id, monitor_id, policy_name, provider_name, provider_type, dedup_key, status, attempts, title, body, reason, created_at, last_attempt_at, last_error, sent_at) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(record.id.to_string())
        .bind(record.incident_id.map(|i| i.to_string()))
        .bind(&record.monitor_id)
        .bind(&record.policy_name)
        .bind(&record.provider_name)
        .bind(&record.provider_type)
        .bind(&record.dedup_key)
        .bind(status_str(record.status))
        .bind(record.attempts as i64)
        .bind(&record.title)
        .bind(&record.body)
        .bind(&record.reason)
        .bind(record.created_at.to_rfc3339())
        .bind(record.last_attempt_at.map(|t| t.to_rfc3339()))
        .bind(&record.last_error)
        .bind(record.sent_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn update_delivery_status(
        &self,
        id: DeliveryId,
        status: DeliveryStatus,
        last_error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE deliveries SET status = ?, attempts = attempts + 1, last_attempt_at = ?, last_error = COALESCE(?, last_error), sent_at = CASE WHEN ? = 'sent' THEN ? ELSE sent_at END WHERE id = ?",
        )
        .bind(status_str(status))
        .bind(at.to_rfc3339())
        .bind(&last_error)
        .bind(status_str(status))
        .bind(at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }

    async fn pending_deliveries(&self, limit: usize) -> Result<Vec<DeliveryRecord>> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            "SELECT * FROM deliveries WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        rows.into_iter().map(DeliveryRow::into_record).collect()
    }

    async fn sent_deliveries_by_dedup_key(
        &self,
        dedup_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            "SELECT * FROM deliveries WHERE dedup_key = ? AND status = 'sent' AND sent_at >= ?",
        )
        .bind(dedup_key)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        rows.into_iter().map(DeliveryRow::into_record).collect()
    }

    async fn sent_deliveries_by_monitor_policy(
        &self,
        monitor_id: &str,
        policy_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            "SELECT * FROM deliveries WHERE monitor_id = ? AND policy_name = ? AND status = 'sent' AND sent_at >= ?",
        )
        .bind(monitor_id)
        .bind(policy_name)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;
        rows.into_iter().map(DeliveryRow::into_record).collect()
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<()> {
        let cutoff = cutoff.to_rfc3339();
        sqlx::query("DELETE FROM heartbeats WHERE checked_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        sqlx::query("DELETE FROM incidents WHERE ended_at IS NOT NULL AND ended_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        sqlx::query("DELETE FROM deliveries WHERE status != 'pending' AND created_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        Ok(())
    }
}
