//! Component G: append-only heartbeat log and the open-incident invariant
//! (§4.G, §8 invariant 4 "at most one open incident per monitor").

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::metrics::Metrics;
use crate::store::{Heartbeat, Incident, MonitorState, Store};

/// The state-change classification the alert engine drives off of.
pub struct HeartbeatOutcome {
    pub prev_state: MonitorState,
    pub curr_state: MonitorState,
    /// `curr_state`, unless the monitor has oscillated enough within the
    /// configured flapping window to be reported as `flapping` instead
    /// (§4.B `flappingWindowChecks`). Incident open/close is driven off
    /// the raw `curr_state`, never this one.
    pub reported_state: MonitorState,
    pub is_state_change: bool,
    pub incident_id: Option<Uuid>,
}

/// Appends `heartbeat`, derives `isStateChange` against the last recorded
/// state (absent last ⇒ previous = `pending`, §4.G), and opens/closes the
/// per-monitor incident as required. `flapping_window_checks` is the
/// cluster's `YuptimeSettings` flapping window (§4.B); `0` or `1` disables
/// flapping classification.
pub async fn record(
    store: &Arc<dyn Store>,
    metrics: &Metrics,
    heartbeat: Heartbeat,
    flapping_window_checks: u32,
) -> Result<HeartbeatOutcome> {
    let prev_state = store
        .last_heartbeat(&heartbeat.monitor_id)
        .await?
        .map(|h| h.state)
        .unwrap_or(MonitorState::Pending);
    let curr_state = heartbeat.state;
    let monitor_id = heartbeat.monitor_id.clone();
    let checked_at = heartbeat.checked_at;
    store.insert_heartbeat(heartbeat).await?;

    let is_state_change = prev_state != curr_state;
    let mut incident_id = None;

    match curr_state {
        MonitorState::Down => {
            if store.open_incident_for(&monitor_id).await?.is_none() {
                let id = Uuid::new_v4();
                store
                    .open_incident(Incident {
                        id,
                        monitor_id: monitor_id.clone(),
                        started_at: checked_at,
                        ended_at: None,
                        duration_sec: None,
                        suppressed: false,
                        acknowledged: false,
                    })
                    .await?;
                metrics.alerts.incidents_opened.inc();
                incident_id = Some(id);
            } else {
                incident_id = store
                    .open_incident_for(&monitor_id)
                    .await?
                    .map(|i| i.id);
            }
        }
        MonitorState::Up => {
            if let Some(open) = store.open_incident_for(&monitor_id).await? {
                let duration_sec = (checked_at - open.started_at).num_seconds();
                store
                    .close_incident(&monitor_id, checked_at, duration_sec)
                    .await?;
                metrics.alerts.incidents_closed.inc();
                incident_id = Some(open.id);
            }
        }
        MonitorState::Flapping | MonitorState::Pending | MonitorState::Paused => {
            incident_id = store
                .open_incident_for(&monitor_id)
                .await?
                .map(|i| i.id);
        }
    }

    let reported_state = if matches!(curr_state, MonitorState::Up | MonitorState::Down) {
        classify_flapping(store, &monitor_id, curr_state, flapping_window_checks).await?
    } else {
        curr_state
    };

    Ok(HeartbeatOutcome {
        prev_state,
        curr_state,
        reported_state,
        is_state_change,
        incident_id,
    })
}

/// Reports `flapping` instead of the raw up/down state when at least half
/// of the last `window` heartbeats differ from their predecessor -- the
/// monitor is oscillating rather than settling. A window of `0` or `1`
/// leaves classification off (too small to define an oscillation).
async fn classify_flapping(
    store: &Arc<dyn Store>,
    monitor_id: &str,
    curr_state: MonitorState,
    window: u32,
) -> Result<MonitorState> {
    if window < 2 {
        return Ok(curr_state);
    }
    let recent = store.recent_heartbeats(monitor_id, window as usize).await?;
    if recent.len() < window as usize {
        return Ok(curr_state);
    }
    let transitions = recent.windows(2).filter(|pair| pair[0].state != pair[1].state).count();
    if transitions * 2 >= recent.len() {
        Ok(MonitorState::Flapping)
    } else {
        Ok(curr_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn hb(monitor_id: &str, state: MonitorState) -> Heartbeat {
        Heartbeat {
            monitor_id: monitor_id.into(),
            state,
            latency_ms: 12.0,
            reason: "ok".into(),
            message: "ok".into(),
            checked_at: Utc::now(),
            attempts: 1,
        }
    }

    #[tokio::test]
    async fn down_then_up_opens_then_closes_incident() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let metrics = Metrics::default();
        let down = record(&store, &metrics, hb("default/m1", MonitorState::Down), 0)
            .await
            .unwrap();
        assert!(down.is_state_change);
        assert!(down.incident_id.is_some());
        assert!(store.open_incident_for("default/m1").await.unwrap().is_some());

        let up = record(&store, &metrics, hb("default/m1", MonitorState::Up), 0)
            .await
            .unwrap();
        assert!(up.is_state_change);
        assert!(store.open_incident_for("default/m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_down_does_not_open_second_incident() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let metrics = Metrics::default();
        record(&store, &metrics, hb("default/m1", MonitorState::Down), 0)
            .await
            .unwrap();
        let second = record(&store, &metrics, hb("default/m1", MonitorState::Down), 0)
            .await
            .unwrap();
        assert!(!second.is_state_change);
        assert_eq!(metrics.alerts.incidents_opened.get(), 1);
    }

    #[tokio::test]
    async fn oscillating_states_are_reported_as_flapping() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let metrics = Metrics::default();
        let states = [
            MonitorState::Down,
            MonitorState::Up,
            MonitorState::Down,
            MonitorState::Up,
        ];
        let mut last = None;
        for state in states {
            last = Some(
                record(&store, &metrics, hb("default/m1", state), 4)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(last.unwrap().reported_state, MonitorState::Flapping);
    }

    #[tokio::test]
    async fn steady_state_is_not_reported_as_flapping() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let metrics = Metrics::default();
        for _ in 0..4 {
            record(&store, &metrics, hb("default/m1", MonitorState::Up), 4)
                .await
                .unwrap();
        }
        let last = record(&store, &metrics, hb("default/m1", MonitorState::Up), 4)
            .await
            .unwrap();
        assert_eq!(last.reported_state, MonitorState::Up);
    }
}
