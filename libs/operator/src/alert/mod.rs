//! Component H: the alert state machine. Consumes a [`heartbeat`]
//! outcome and renders zero or more [`AlertToDeliver`]s for the delivery
//! queue to enqueue (§4.H).

pub mod policy;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::heartbeat::HeartbeatOutcome;
use crate::store::MonitorState;
use policy::PolicyView;
use yuptime_crd::MatchSubject;

pub const DEFAULT_TITLE_TEMPLATE: &str = "{state}: {monitorName}";
pub const DEFAULT_BODY_TEMPLATE: &str = "{monitorName} is {state} ({reason}): {message}";

pub struct AlertEvent<'a> {
    pub monitor_namespace: &'a str,
    pub monitor_name: &'a str,
    pub labels: &'a BTreeMap<String, String>,
    pub tags: &'a [String],
    pub reason: &'a str,
    pub message: &'a str,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub outcome: &'a HeartbeatOutcome,
}

#[derive(Clone, Debug)]
pub struct AlertToDeliver {
    pub policy_name: String,
    pub provider_name: String,
    pub provider_type: String,
    pub monitor_id: String,
    pub incident_id: Option<uuid::Uuid>,
    pub dedup_key: String,
    pub title: String,
    pub body: String,
    pub dedup_window_minutes: u32,
    pub rate_limit_min_minutes: u32,
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

fn render(template: &str, event: &AlertEvent<'_>, monitor_id: &str) -> String {
    template
        .replace("{monitorName}", event.monitor_name)
        .replace("{monitorId}", monitor_id)
        .replace("{state}", state_str(event.outcome.reported_state))
        .replace("{reason}", event.reason)
        .replace("{message}", event.message)
        .replace("{latency}", &event.latency_ms.to_string())
}

/// Produces the `AlertToDeliver` set for every policy/provider pair whose
/// selector matches the monitor and whose trigger fires for this transition
/// (§4.H steps 2-3).
pub fn process_event(policies: &PolicyView, event: &AlertEvent<'_>) -> Vec<AlertToDeliver> {
    let monitor_id = format!("{}/{}", event.monitor_namespace, event.monitor_name);
    let subject = MatchSubject {
        namespace: event.monitor_namespace,
        name: event.monitor_name,
        labels: event.labels,
        tags: event.tags,
    };

    let mut out = Vec::new();
    for named in policies.matching(&subject) {
        let triggers = &named.spec.triggers;
        let fires = match event.outcome.reported_state {
            MonitorState::Down => triggers.on_down,
            MonitorState::Up => triggers.on_up,
            MonitorState::Flapping => triggers.on_flapping,
            MonitorState::Pending | MonitorState::Paused => false,
        };
        if !fires {
            continue;
        }

        let (title_template, body_template) = named
            .spec
            .formatting
            .as_ref()
            .map(|f| {
                (
                    f.title_template.as_deref().unwrap_or(DEFAULT_TITLE_TEMPLATE),
                    f.body_template.as_deref().unwrap_or(DEFAULT_BODY_TEMPLATE),
                )
            })
            .unwrap_or((DEFAULT_TITLE_TEMPLATE, DEFAULT_BODY_TEMPLATE));
        let title = render(title_template, event, &monitor_id);
        let body = render(body_template, event, &monitor_id);

        let dedup_key = named
            .spec
            .dedup
            .as_ref()
            .and_then(|d| d.key.as_deref())
            .map(|tmpl| render(tmpl, event, &monitor_id))
            .unwrap_or_else(|| format!("{monitor_id}:{}", named.name));

        let dedup_window_minutes = named.spec.dedup.as_ref().map(|d| d.window_minutes).unwrap_or(0);
        let rate_limit_min_minutes = named
            .spec
            .rate_limit
            .as_ref()
            .map(|r| r.min_minutes_between_alerts)
            .unwrap_or(0);

        for provider_name in &named.spec.providers {
            let provider_type = policies
                .provider(provider_name)
                .map(|p| p.provider_type.clone())
                .unwrap_or_else(|| "unknown".to_string());
            out.push(AlertToDeliver {
                policy_name: named.name.clone(),
                provider_name: provider_name.clone(),
                provider_type,
                monitor_id: monitor_id.clone(),
                incident_id: event.outcome.incident_id,
                dedup_key: dedup_key.clone(),
                title: title.clone(),
                body: body.clone(),
                dedup_window_minutes,
                rate_limit_min_minutes,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use yuptime_crd::{Dedup, NotificationPolicySpec, Selector, Triggers};

    fn outcome(curr: MonitorState) -> HeartbeatOutcome {
        HeartbeatOutcome {
            prev_state: MonitorState::Up,
            curr_state: curr,
            reported_state: curr,
            is_state_change: true,
            incident_id: None,
        }
    }

    #[test]
    fn on_down_fires_for_matching_policy_and_default_templates() {
        let mut policies = PolicyView::new();
        policies.upsert_policy(
            "p1".into(),
            NotificationPolicySpec {
                match_: Selector::default(),
                priority: 0,
                triggers: Triggers {
                    on_down: true,
                    on_up: false,
                    on_flapping: false,
                    on_cert_expiring: false,
                },
                providers: vec!["prov1".into()],
                dedup: Some(Dedup {
                    key: None,
                    window_minutes: 10,
                }),
                rate_limit: None,
                resend: None,
                formatting: None,
            },
        );
        let labels = BTreeMap::new();
        let outcome = outcome(MonitorState::Down);
        let event = AlertEvent {
            monitor_namespace: "default",
            monitor_name: "m1",
            labels: &labels,
            tags: &[],
            reason: "TIMEOUT",
            message: "timed out",
            latency_ms: 5000.0,
            timestamp: Utc::now(),
            outcome: &outcome,
        };
        let alerts = process_event(&policies, &event);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "down: m1");
        assert_eq!(alerts[0].dedup_key, "default/m1:p1");
    }

    #[test]
    fn on_up_does_not_fire_when_only_on_down_configured() {
        let mut policies = PolicyView::new();
        policies.upsert_policy(
            "p1".into(),
            NotificationPolicySpec {
                match_: Selector::default(),
                priority: 0,
                triggers: Triggers {
                    on_down: true,
                    on_up: false,
                    on_flapping: false,
                    on_cert_expiring: false,
                },
                providers: vec!["prov1".into()],
                dedup: None,
                rate_limit: None,
                resend: None,
                formatting: None,
            },
        );
        let labels = BTreeMap::new();
        let outcome = outcome(MonitorState::Up);
        let event = AlertEvent {
            monitor_namespace: "default",
            monitor_name: "m1",
            labels: &labels,
            tags: &[],
            reason: "OK",
            message: "recovered",
            latency_ms: 20.0,
            timestamp: Utc::now(),
            outcome: &outcome,
        };
        assert!(process_event(&policies, &event).is_empty());
    }
}
